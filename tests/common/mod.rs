//! Общая обвязка интеграционных тестов: модуль-отвод, записывающий всё, что
//! с ним происходит, и статический загрузчик с ним и встроенными модулями.

#![allow(dead_code)]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use gatemesh::{
    modules::{builtin, config_as, LoaderCounters},
    sync::Lock,
    ApiVersion, BrokerHandle, GatemeshResult, GatewaySettings, LoaderBinding, Loaders, Message,
    Module, ModuleApi, ModuleConfig, ModuleEntry, ModuleFactory, StaticLoader, StatusCode,
};
use gatemesh_error::LoaderError;
use serde::Deserialize;
use serde_json::json;

/// Что произошло с отводом.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created(String),
    Started(String),
    Received {
        module: String,
        payload: Bytes,
        source: Option<String>,
        seq: Option<u64>,
    },
    Destroyed(String),
}

#[derive(Default)]
pub struct Journal {
    events: Lock<Vec<Event>>,
}

impl Journal {
    fn push(
        &self,
        event: Event,
    ) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Created(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Destroyed(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Полученные модулем `module` нагрузки в порядке доставки.
    pub fn received_by(
        &self,
        module: &str,
    ) -> Vec<Bytes> {
        self.received(module)
            .into_iter()
            .map(|(payload, _, _)| payload)
            .collect()
    }

    /// `(payload, source, seq)` для всех доставок модулю `module`.
    pub fn received(
        &self,
        module: &str,
    ) -> Vec<(Bytes, Option<String>, Option<u64>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Received {
                    module: m,
                    payload,
                    source,
                    seq,
                } if m == module => Some((payload, source, seq)),
                _ => None,
            })
            .collect()
    }

    pub fn total_received(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Received { .. }))
            .count()
    }
}

/// Аргументы отвода.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TapConfig {
    /// Переслать каждое полученное сообщение от своего имени.
    pub forward: bool,
    /// `create` завершается ошибкой.
    pub fail_create: bool,
    /// Задержка внутри `receive`, микросекунды.
    pub receive_delay_us: u64,
}

struct Tap {
    name: String,
    broker: BrokerHandle,
    config: TapConfig,
    journal: Arc<Journal>,
}

impl Module for Tap {
    fn receive(
        &self,
        message: &Message,
    ) {
        if self.config.receive_delay_us > 0 {
            thread::sleep(Duration::from_micros(self.config.receive_delay_us));
        }
        self.journal.push(Event::Received {
            module: self.name.clone(),
            payload: message.payload().clone(),
            source: message.property("source").map(str::to_string),
            seq: message.property("seq").and_then(|s| s.parse().ok()),
        });
        if self.config.forward {
            // Ошибка публикации допустима только во время остановки.
            let _ = self.broker.publish(message);
        }
    }

    fn start(&self) {
        self.journal.push(Event::Started(self.name.clone()));
    }

    fn destroy(self: Box<Self>) {
        self.journal.push(Event::Destroyed(self.name.clone()));
    }
}

struct TapFactory {
    journal: Arc<Journal>,
}

impl ModuleFactory for TapFactory {
    fn parse_configuration(
        &self,
        raw: &serde_json::Value,
    ) -> GatemeshResult<ModuleConfig> {
        let config: TapConfig = if raw.is_null() {
            TapConfig::default()
        } else {
            serde_json::from_value(raw.clone()).map_err(|e| {
                gatemesh_error::ConfigError::Invalid {
                    reason: e.to_string(),
                }
            })?
        };
        Ok(Box::new(config))
    }

    fn create(
        &self,
        broker: BrokerHandle,
        config: &ModuleConfig,
    ) -> GatemeshResult<Box<dyn Module>> {
        let name = broker.source().to_string();
        let config = config_as::<TapConfig>(config, &name)?.clone();
        if config.fail_create {
            return Err(LoaderError::CreateFailed {
                module: name,
                reason: "tap configured to fail".to_string(),
            }
            .into());
        }
        self.journal.push(Event::Created(name.clone()));
        Ok(Box::new(Tap {
            name,
            broker,
            config,
            journal: Arc::clone(&self.journal),
        }))
    }
}

/// Статический загрузчик с отводом (`tap`) и встроенными модулями.
pub struct Harness {
    pub journal: Arc<Journal>,
    pub loader: StaticLoader,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Arc::new(Journal::default());
        let for_tap = Arc::clone(&journal);
        let loader = builtin::static_loader().register("tap", move || {
            ModuleApi::new(
                ApiVersion::V2,
                Arc::new(TapFactory {
                    journal: Arc::clone(&for_tap),
                }),
            )
        });
        Self { journal, loader }
    }

    pub fn loaders(&self) -> Loaders {
        Loaders::new().with(self.loader.clone())
    }

    pub fn counters(&self) -> LoaderCounters {
        self.loader.stats()
    }
}

pub fn tap(name: &str) -> ModuleEntry {
    ModuleEntry::new(
        name,
        LoaderBinding::static_symbol("tap"),
        serde_json::Value::Null,
    )
}

pub fn tap_with(
    name: &str,
    args: serde_json::Value,
) -> ModuleEntry {
    ModuleEntry::new(name, LoaderBinding::static_symbol("tap"), args)
}

pub fn forwarding_tap(name: &str) -> ModuleEntry {
    tap_with(name, json!({ "forward": true }))
}

pub fn settings(workers: usize) -> GatewaySettings {
    GatewaySettings {
        worker_count: workers,
        ..GatewaySettings::default()
    }
}

pub fn tagged(
    payload: &str,
    source: &str,
    seq: u64,
) -> Message {
    Message::builder()
        .payload(payload.as_bytes())
        .property("source", source)
        .property("seq", seq.to_string())
        .build()
}

/// Ждёт выполнения условия не дольше пяти секунд.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn assert_code(
    result: GatemeshResult<impl std::fmt::Debug>,
    expected: StatusCode,
) {
    match result {
        Ok(value) => panic!("expected {expected:?}, got Ok({value:?})"),
        Err(e) => assert_eq!(e.status_code(), expected, "unexpected error: {e}"),
    }
}
