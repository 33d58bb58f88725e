use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use gatemesh_error::{GatemeshResult, GatewayError, ResultExt, StackError};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{
    check_module_name, validate_links, EventRegistry, GatewayEvent, GatewayEventKind,
    GatewayProperties, Link,
};
use crate::{
    broker::{Broker, BrokerStats, RoutingIndex},
    modules::{Loaders, ModuleInfo, ModuleInstance, ModuleSlot, ModuleState},
    sync::Lock,
    GatewaySettings, Message,
};

/// Состояние шлюза. Экземпляр одноразовый: ни одно состояние не
/// повторяется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayState {
    Empty,
    Building,
    Running,
    Stopping,
    Terminated,
}

impl GatewayState {
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayState::Empty => "EMPTY",
            GatewayState::Building => "BUILDING",
            GatewayState::Running => "RUNNING",
            GatewayState::Stopping => "STOPPING",
            GatewayState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for GatewayState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Оркестратор: владеет брокером, модулями и загрузчиками.
///
/// Разрушение идёт в фиксированном порядке: остановка брокера (все
/// рабочие потоки завершены), `destroy` модулей в обратном порядке
/// создания, затем выгрузка их единиц кода.
pub struct Gateway {
    id: Uuid,
    state: Lock<GatewayState>,
    broker: Broker,
    modules: Lock<Vec<ModuleInstance>>,
    names: HashSet<Arc<str>>,
    links: Vec<Link>,
    loaders: Loaders,
    settings: GatewaySettings,
    events: EventRegistry,
}

impl Gateway {
    /// Строит граф: модули по порядку, затем проверка связей.
    ///
    /// Любая ошибка откатывает уже созданные модули (`destroy` и выгрузка
    /// в обратном порядке), так что частично живого шлюза не бывает.
    pub fn create(
        properties: GatewayProperties,
        loaders: Loaders,
        settings: GatewaySettings,
    ) -> GatemeshResult<Self> {
        settings.validate()?;
        let id = Uuid::new_v4();
        let span = info_span!("gateway", id = %id);
        let _guard = span.enter();

        let mut state = GatewayState::Empty;
        debug!(
            state = %state,
            modules = properties.modules.len(),
            links = properties.links.len(),
            "Creating gateway"
        );
        state = GatewayState::Building;

        let broker = Broker::new(settings.broker_settings());
        let mut modules: Vec<ModuleInstance> = Vec::with_capacity(properties.modules.len());
        let mut names: HashSet<Arc<str>> = HashSet::with_capacity(properties.modules.len());

        for entry in &properties.modules {
            let created = check_module_name(&entry.name, &names).and_then(|()| {
                ModuleInstance::create(entry, &loaders, broker.handle(entry.name.as_str()))
            });
            match created {
                Ok(instance) => {
                    names.insert(Arc::from(entry.name.as_str()));
                    modules.push(instance);
                }
                Err(e) => {
                    warn!(module = %entry.name, error = %e, created = modules.len(), "Module creation failed; rolling back");
                    rollback(broker, modules, &loaders);
                    return Err(e.context(format!("creating module '{}'", entry.name)));
                }
            }
        }

        if let Err(e) = validate_links(&properties.links, &names, settings.link_policy()) {
            warn!(error = %e, "Link validation failed; rolling back");
            rollback(broker, modules, &loaders);
            return Err(e.context("validating links"));
        }

        info!(state = %state, modules = modules.len(), links = properties.links.len(), "Gateway created");
        drop(_guard);
        Ok(Self {
            id,
            state: Lock::new(state),
            broker,
            modules: Lock::new(modules),
            names,
            links: properties.links,
            loaders,
            settings,
            events: EventRegistry::default(),
        })
    }

    /// `create` с настройками по умолчанию.
    pub fn with_defaults(
        properties: GatewayProperties,
        loaders: Loaders,
    ) -> GatemeshResult<Self> {
        Self::create(properties, loaders, GatewaySettings::default())
    }

    /// Строит индекс маршрутизации, запускает рабочие потоки и разрешает
    /// доставку. Хуки `start` модулей отрабатывают до возврата.
    pub fn start(&self) -> GatemeshResult<()> {
        let span = info_span!("gateway", id = %self.id);
        let _guard = span.enter();

        let mut state = self.state.lock();
        if *state != GatewayState::Building {
            return Err(GatewayError::InvalidState {
                operation: "start",
                state: state.as_str(),
            }
            .into());
        }

        let start_targets: Vec<Arc<ModuleSlot>> = {
            let modules = self.modules.lock();
            let slots: HashMap<Arc<str>, Arc<ModuleSlot>> = modules
                .iter()
                .map(|m| (Arc::clone(m.slot().name()), Arc::clone(m.slot())))
                .collect();
            let routing = RoutingIndex::build(&self.links, &slots)?;
            for module in modules.iter() {
                module.activate();
            }
            self.broker.start(routing).context("starting broker")?;
            modules.iter().filter_map(ModuleInstance::start_target).collect()
        };
        *state = GatewayState::Running;
        drop(state);

        for slot in &start_targets {
            slot.start();
        }
        info!(workers = self.settings.worker_count, "Gateway running");
        self.fire(GatewayEventKind::Started);
        Ok(())
    }

    /// Публикует сообщение от имени модуля `source`.
    pub fn publish(
        &self,
        source: &str,
        message: &Message,
    ) -> GatemeshResult<()> {
        let state = *self.state.lock();
        if state != GatewayState::Running {
            return Err(GatewayError::NotRunning {
                state: state.as_str(),
            }
            .into());
        }
        let source = self
            .names
            .get(source)
            .ok_or_else(|| GatewayError::UnknownModule {
                name: source.to_string(),
            })?;
        self.broker.publish_from(source, message)
    }

    /// Останавливает брокер и разрушает граф. Допустим из `Building`
    /// (без этапа доставки оставшихся сообщений) и из `Running`.
    pub fn stop(&self) -> GatemeshResult<()> {
        if self.broker.is_worker_thread() {
            return Err(GatewayError::InvalidState {
                operation: "stop from a broker worker",
                state: self.state().as_str(),
            }
            .into());
        }
        let previous = {
            let mut state = self.state.lock();
            match *state {
                GatewayState::Building | GatewayState::Running => {
                    let previous = *state;
                    *state = GatewayState::Stopping;
                    previous
                }
                other => {
                    return Err(GatewayError::InvalidState {
                        operation: "stop",
                        state: other.as_str(),
                    }
                    .into());
                }
            }
        };
        self.teardown(previous)
    }

    /// Разрушает шлюз, если это ещё не сделано через `stop`.
    pub fn destroy(self) -> GatemeshResult<()> {
        match self.state() {
            GatewayState::Terminated => Ok(()),
            _ => self.stop(),
        }
    }

    fn teardown(
        &self,
        previous: GatewayState,
    ) -> GatemeshResult<()> {
        let span = info_span!("gateway", id = %self.id);
        let _guard = span.enter();
        info!(from = %previous, "Gateway stopping");
        self.fire(GatewayEventKind::Stopping);

        let mut failures: Vec<StackError> = Vec::new();
        if let Err(e) = self.broker.stop() {
            failures.push(e.context("stopping broker"));
        }

        let modules = std::mem::take(&mut *self.modules.lock());
        let mut infos: Vec<ModuleInfo> = modules.iter().map(ModuleInstance::info).collect();
        failures.extend(destroy_modules(modules, &self.loaders));
        for info in &mut infos {
            info.state = ModuleState::Unloaded;
        }

        *self.state.lock() = GatewayState::Terminated;
        self.events.fire(&GatewayEvent {
            kind: GatewayEventKind::Destroyed,
            gateway_id: self.id,
            modules: infos,
        });

        if failures.is_empty() {
            info!(stats = ?self.broker.stats(), "Gateway terminated");
            Ok(())
        } else {
            for failure in &failures {
                error!(error = %failure, "Teardown step failed");
            }
            Err(GatewayError::TeardownFailed { failures }.into())
        }
    }

    /// Подписка на переход шлюза.
    pub fn on_event<F>(
        &self,
        kind: GatewayEventKind,
        callback: F,
    ) where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.events.register(kind, Arc::new(callback));
    }

    fn fire(
        &self,
        kind: GatewayEventKind,
    ) {
        if !self.events.has_listeners(kind) {
            return;
        }
        self.events.fire(&GatewayEvent {
            kind,
            gateway_id: self.id,
            modules: self.module_list(),
        });
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> GatewayState {
        *self.state.lock()
    }

    /// Снимок модулей в порядке создания.
    pub fn module_list(&self) -> Vec<ModuleInfo> {
        self.modules.lock().iter().map(ModuleInstance::info).collect()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn broker_stats(&self) -> BrokerStats {
        self.broker.stats()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        let state = self.state();
        if matches!(state, GatewayState::Building | GatewayState::Running) {
            if let Err(e) = self.stop() {
                error!(gateway = %self.id, error = %e, "Gateway teardown on drop failed");
            }
        }
    }
}

impl fmt::Debug for Gateway {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("modules", &self.module_list())
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

/// Разрушает модули в обратном порядке: сначала `destroy` всех, затем
/// выгрузка всех единиц кода.
fn destroy_modules(
    mut modules: Vec<ModuleInstance>,
    loaders: &Loaders,
) -> Vec<StackError> {
    let mut failures = Vec::new();
    for module in modules.iter_mut().rev() {
        failures.extend(module.shutdown());
    }
    for module in modules.into_iter().rev() {
        failures.extend(module.unload(loaders));
    }
    failures
}

/// Откат `create`. Очередь брокера может держать сообщения, опубликованные
/// из `create`, поэтому она освобождается до выгрузки модулей.
fn rollback(
    broker: Broker,
    modules: Vec<ModuleInstance>,
    loaders: &Loaders,
) {
    if let Err(e) = broker.stop() {
        warn!(error = %e, "Failed to stop broker during rollback");
    }
    drop(broker);
    for failure in destroy_modules(modules, loaders) {
        warn!(error = %failure, "Rollback step failed");
    }
}
