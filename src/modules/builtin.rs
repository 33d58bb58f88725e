//! Встроенные модули для демонстрационного запуска.
//!
//! - `heartbeat`: публикует сообщение с заданным интервалом из
//!   собственного потока.
//! - `logger`: пишет каждое полученное сообщение в `tracing`.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use gatemesh_error::{ConfigError, GatemeshResult};
use parking_lot::MutexGuard;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{config_as, ApiVersion, Module, ModuleApi, ModuleConfig, ModuleFactory, StaticLoader};
use crate::{
    sync::{Condition, Lock, WaitTimeout},
    BrokerHandle, Message,
};

/// Статический загрузчик со всеми встроенными модулями.
pub fn static_loader() -> StaticLoader {
    StaticLoader::new()
        .register("heartbeat", heartbeat_api)
        .register("logger", logger_api)
}

pub fn heartbeat_api() -> ModuleApi {
    ModuleApi::new(ApiVersion::V2, Arc::new(HeartbeatFactory))
}

pub fn logger_api() -> ModuleApi {
    ModuleApi::new(ApiVersion::V1, Arc::new(LoggerFactory))
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_payload() -> String {
    "heartbeat".to_string()
}

/// Аргументы модуля `heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_payload")]
    pub payload: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            payload: default_payload(),
            properties: BTreeMap::new(),
        }
    }
}

struct HeartbeatFactory;

impl ModuleFactory for HeartbeatFactory {
    fn parse_configuration(
        &self,
        raw: &serde_json::Value,
    ) -> GatemeshResult<ModuleConfig> {
        let config = if raw.is_null() {
            HeartbeatConfig::default()
        } else {
            serde_json::from_value::<HeartbeatConfig>(raw.clone()).map_err(|e| {
                ConfigError::ParseFailed {
                    module: "heartbeat".to_string(),
                    reason: e.to_string(),
                }
            })?
        };
        if config.interval_ms == 0 {
            return Err(ConfigError::ParseFailed {
                module: "heartbeat".to_string(),
                reason: "interval_ms must be positive".to_string(),
            }
            .into());
        }
        Ok(Box::new(config))
    }

    fn create(
        &self,
        broker: BrokerHandle,
        config: &ModuleConfig,
    ) -> GatemeshResult<Box<dyn Module>> {
        let config = config_as::<HeartbeatConfig>(config, broker.source())?.clone();
        Ok(Box::new(Heartbeat {
            broker,
            config,
            ticker: Arc::new(Ticker::default()),
            thread: Lock::new(None),
        }))
    }
}

#[derive(Default)]
struct Ticker {
    stopped: Lock<bool>,
    wake: Condition,
}

struct Heartbeat {
    broker: BrokerHandle,
    config: HeartbeatConfig,
    ticker: Arc<Ticker>,
    thread: Lock<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    fn run(
        broker: BrokerHandle,
        config: HeartbeatConfig,
        ticker: Arc<Ticker>,
    ) {
        let mut sequence: u64 = 0;
        let mut stopped = ticker.stopped.lock();
        while !*stopped {
            // Ok(()) означает сигнал (или ложное пробуждение): перепроверяем
            // флаг. Таймаут означает, что пора публиковать.
            if ticker
                .wake
                .wait(&mut stopped, WaitTimeout::Millis(config.interval_ms))
                .is_ok()
            {
                continue;
            }
            sequence += 1;
            let message = Message::builder()
                .payload(config.payload.as_bytes().to_vec())
                .properties(config.properties.clone())
                .property("sequence", sequence.to_string())
                .build();
            MutexGuard::unlocked(&mut stopped, || {
                if let Err(e) = broker.publish(&message) {
                    debug!(module = %broker.source(), error = %e, "Heartbeat publish rejected");
                }
            });
        }
    }
}

impl Module for Heartbeat {
    fn receive(
        &self,
        _message: &Message,
    ) {
    }

    fn start(&self) {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return;
        }
        let broker = self.broker.clone();
        let config = self.config.clone();
        let ticker = Arc::clone(&self.ticker);
        let spawned = std::thread::Builder::new()
            .name(format!("heartbeat-{}", self.broker.source()))
            .spawn(move || Heartbeat::run(broker, config, ticker));
        match spawned {
            Ok(handle) => *thread = Some(handle),
            Err(e) => warn!(module = %self.broker.source(), error = %e, "Failed to spawn heartbeat thread"),
        }
    }

    fn destroy(self: Box<Self>) {
        *self.ticker.stopped.lock() = true;
        self.ticker.wake.post_all();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!(module = %self.broker.source(), "Heartbeat thread panicked");
            }
        }
    }
}

/// Аргументы модуля `logger`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    #[serde(default)]
    pub label: Option<String>,
}

struct LoggerFactory;

impl ModuleFactory for LoggerFactory {
    fn parse_configuration(
        &self,
        raw: &serde_json::Value,
    ) -> GatemeshResult<ModuleConfig> {
        if raw.is_null() {
            return Ok(Box::new(LoggerConfig::default()));
        }
        let config = serde_json::from_value::<LoggerConfig>(raw.clone()).map_err(|e| {
            ConfigError::ParseFailed {
                module: "logger".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Box::new(config))
    }

    fn create(
        &self,
        broker: BrokerHandle,
        config: &ModuleConfig,
    ) -> GatemeshResult<Box<dyn Module>> {
        let config = config_as::<LoggerConfig>(config, broker.source())?;
        let label = config
            .label
            .clone()
            .unwrap_or_else(|| broker.source().to_string());
        Ok(Box::new(Logger {
            label,
            received: AtomicU64::new(0),
        }))
    }
}

struct Logger {
    label: String,
    received: AtomicU64,
}

impl Module for Logger {
    fn receive(
        &self,
        message: &Message,
    ) {
        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            target: "gatemesh::logger",
            label = %self.label,
            count,
            payload = %String::from_utf8_lossy(message.payload()),
            properties = ?message.properties(),
            "Message received"
        );
    }

    fn destroy(self: Box<Self>) {
        info!(
            target: "gatemesh::logger",
            label = %self.label,
            total = self.received.load(Ordering::Relaxed),
            "Logger stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_config_defaults() {
        let factory = HeartbeatFactory;
        let config = factory.parse_configuration(&serde_json::Value::Null).unwrap();
        let parsed = config_as::<HeartbeatConfig>(&config, "hb").unwrap();
        assert_eq!(parsed, &HeartbeatConfig::default());
    }

    #[test]
    fn test_heartbeat_config_rejects_zero_interval() {
        let err = HeartbeatFactory
            .parse_configuration(&serde_json::json!({"interval_ms": 0}))
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_heartbeat_config_rejects_unknown_field() {
        let err = HeartbeatFactory
            .parse_configuration(&serde_json::json!({"intervall": 5}))
            .unwrap_err();
        assert!(err.to_string().contains("intervall"));
    }

    #[test]
    fn test_logger_config_label() {
        let config = LoggerFactory
            .parse_configuration(&serde_json::json!({"label": "sink"}))
            .unwrap();
        let parsed = config_as::<LoggerConfig>(&config, "logger").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("sink"));
    }

    #[test]
    fn test_static_loader_lists_builtins() {
        assert_eq!(static_loader().symbols(), vec!["heartbeat", "logger"]);
    }
}
