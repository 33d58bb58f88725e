use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use gatemesh_error::{
    ConfigError, GatemeshResult, GenericError, LoaderError, StackError, StatusCode,
};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use super::{ApiVersion, CodeUnit, EntryDescriptor, Loader, LoaderKind, Loaders, Module, ModuleApi};
use crate::{BrokerHandle, Message, ModuleEntry};

/// Состояние модуля относительно доставки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Создан, доставка ещё не разрешена.
    Loaded,
    /// Получает сообщения.
    Active,
    /// Доставка запрещена, идёт `destroy`.
    Draining,
    /// `destroy` выполнен, единица кода выгружена.
    Unloaded,
}

impl fmt::Display for ModuleState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ModuleState::Loaded => "LOADED",
            ModuleState::Active => "ACTIVE",
            ModuleState::Draining => "DRAINING",
            ModuleState::Unloaded => "UNLOADED",
        };
        f.write_str(s)
    }
}

/// Описание модуля для внешнего наблюдателя.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub loader: LoaderKind,
    pub entry: EntryDescriptor,
    pub version: ApiVersion,
    pub state: ModuleState,
}

/// Итог попытки доставить сообщение одному приёмнику.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Inactive,
    Panicked,
}

struct SlotInner {
    state: ModuleState,
    module: Option<Box<dyn Module>>,
}

/// Точка доставки: модуль и флаг состояния под одной блокировкой.
///
/// Рабочие потоки держат блокировку на чтение на время `receive`, поэтому
/// переход в `Draining` (блокировка на запись) дожидается всех текущих
/// доставок, и после него ни один поток не войдёт в код модуля.
pub(crate) struct ModuleSlot {
    name: Arc<str>,
    inner: RwLock<SlotInner>,
}

impl ModuleSlot {
    pub(crate) fn new(
        name: Arc<str>,
        module: Box<dyn Module>,
    ) -> Self {
        Self {
            name,
            inner: RwLock::new(SlotInner {
                state: ModuleState::Loaded,
                module: Some(module),
            }),
        }
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn state(&self) -> ModuleState {
        self.inner.read().state
    }

    pub(crate) fn deliver(
        &self,
        message: &Message,
    ) -> Delivery {
        let guard = self.inner.read();
        if guard.state != ModuleState::Active {
            return Delivery::Inactive;
        }
        let Some(module) = guard.module.as_ref() else {
            return Delivery::Inactive;
        };
        match catch_unwind(AssertUnwindSafe(|| module.receive(message))) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                error!(module = %self.name, "Module panicked in receive; message dropped for this sink");
                Delivery::Panicked
            }
        }
    }

    pub(crate) fn activate(&self) {
        let mut guard = self.inner.write();
        if guard.state == ModuleState::Loaded {
            guard.state = ModuleState::Active;
        }
    }

    pub(crate) fn start(&self) {
        let guard = self.inner.read();
        if guard.state != ModuleState::Active {
            return;
        }
        if let Some(module) = guard.module.as_ref() {
            if catch_unwind(AssertUnwindSafe(|| module.start())).is_err() {
                error!(module = %self.name, "Module panicked in start");
            }
        }
    }

    fn drain(&self) -> Option<Box<dyn Module>> {
        let mut guard = self.inner.write();
        guard.state = ModuleState::Draining;
        guard.module.take()
    }

    fn mark_unloaded(&self) {
        self.inner.write().state = ModuleState::Unloaded;
    }
}

/// Загруженный модуль: единица кода, таблица API и живое состояние.
///
/// Порядок освобождения фиксирован: модуль (`destroy`), затем таблица API,
/// затем единица кода. Код модуля не переживает свою библиотеку.
pub struct ModuleInstance {
    name: Arc<str>,
    loader: LoaderKind,
    entry: EntryDescriptor,
    version: ApiVersion,
    slot: Arc<ModuleSlot>,
    api: Option<ModuleApi>,
    unit: Option<CodeUnit>,
}

impl ModuleInstance {
    /// Загружает единицу кода, разбирает конфигурацию и вызывает `create`.
    /// При ошибке после загрузки единица кода выгружается.
    pub(crate) fn create(
        entry: &ModuleEntry,
        loaders: &Loaders,
        broker: BrokerHandle,
    ) -> GatemeshResult<Self> {
        let name: Arc<str> = Arc::clone(broker.source());
        let kind = entry.loader.kind;
        let loader = loaders.get(kind)?;
        let unit = loader.load(&entry.loader.entrypoint)?;
        let broker = match unit.anchor() {
            Some(anchor) => broker.with_anchor(anchor),
            None => broker,
        };

        let (api, module) = match instantiate(&name, loader, &unit, &entry.args, broker) {
            Ok(created) => created,
            Err(e) => {
                // Ошибка могла быть построена кодом библиотеки.
                let e = match unit.kind() {
                    LoaderKind::Dynamic => detach(e),
                    LoaderKind::Static => e,
                };
                if let Err(unload_err) = loader.unload(unit) {
                    warn!(module = %name, error = %unload_err, "Unload after failed create also failed");
                }
                return Err(e);
            }
        };

        debug!(module = %name, loader = %kind, version = %api.version(), "Module created");
        Ok(Self {
            slot: Arc::new(ModuleSlot::new(Arc::clone(&name), module)),
            name,
            loader: kind,
            entry: entry.loader.entrypoint.clone(),
            version: api.version(),
            api: Some(api),
            unit: Some(unit),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ModuleState {
        self.slot.state()
    }

    pub fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.name.to_string(),
            loader: self.loader,
            entry: self.entry.clone(),
            version: self.version,
            state: self.slot.state(),
        }
    }

    pub(crate) fn slot(&self) -> &Arc<ModuleSlot> {
        &self.slot
    }

    /// Разрешает доставку сообщений модулю.
    pub(crate) fn activate(&self) {
        self.slot.activate();
    }

    /// Точка доставки для хука `start`, если версия API его предусматривает.
    pub(crate) fn start_target(&self) -> Option<Arc<ModuleSlot>> {
        self.version
            .supports_start()
            .then(|| Arc::clone(&self.slot))
    }

    /// Запрещает доставку и вызывает `destroy` модуля. Таблица API
    /// освобождается сразу после этого; единица кода остаётся загруженной.
    pub(crate) fn shutdown(&mut self) -> Option<StackError> {
        let module = self.slot.drain()?;
        self.api = None;
        if catch_unwind(AssertUnwindSafe(|| module.destroy())).is_err() {
            error!(module = %self.name, "Module panicked in destroy");
            return Some(StackError::new(GenericError::new(
                StatusCode::Internal,
                format!("module '{}' panicked in destroy", self.name),
            )));
        }
        debug!(module = %self.name, "Module destroyed");
        None
    }

    /// Выгружает единицу кода. Вызывается после `shutdown`.
    pub(crate) fn unload(
        mut self,
        loaders: &Loaders,
    ) -> Option<StackError> {
        self.api = None;
        let result = match self.unit.take() {
            Some(unit) => loaders
                .get(self.loader)
                .and_then(|loader| loader.unload(unit)),
            None => Ok(()),
        };
        self.slot.mark_unloaded();
        result
            .err()
            .map(|e| e.context(format!("unloading module '{}'", self.name)))
    }

    /// `shutdown` и `unload` подряд; ошибки не прерывают разрушение.
    #[cfg(test)]
    pub(crate) fn destroy(
        mut self,
        loaders: &Loaders,
    ) -> Vec<StackError> {
        let mut failures: Vec<StackError> = self.shutdown().into_iter().collect();
        failures.extend(self.unload(loaders));
        failures
    }
}

impl Drop for ModuleInstance {
    fn drop(&mut self) {
        if self.unit.is_some() {
            warn!(module = %self.name, "Module instance dropped without destroy; releasing");
            drop(self.slot.drain());
            self.api = None;
            self.slot.mark_unloaded();
        }
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("name", &self.name)
            .field("loader", &self.loader)
            .field("version", &self.version)
            .field("state", &self.slot.state())
            .finish()
    }
}

fn instantiate(
    name: &Arc<str>,
    loader: &Loader,
    unit: &CodeUnit,
    args: &serde_json::Value,
    broker: BrokerHandle,
) -> GatemeshResult<(ModuleApi, Box<dyn Module>)> {
    let api = loader.get_api(unit)?;
    let factory = Arc::clone(api.factory());

    let config = guarded(name, "parse_configuration", || factory.parse_configuration(args))
        .map_err(|e| {
            if e.is_configuration_error() {
                e
            } else {
                ConfigError::ParseFailed {
                    module: name.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }
        })?;

    let created = guarded(name, "create", || factory.create(broker, &config));
    factory.free_configuration(config);

    let module = created.map_err(|e| {
        if e.is_configuration_error() || e.is_resource_error() || e.is_loader_error() {
            e.context(format!("creating module '{name}'"))
        } else {
            LoaderError::CreateFailed {
                module: name.to_string(),
                reason: e.to_string(),
            }
            .into()
        }
    })?;
    drop(factory);
    Ok((api, module))
}

/// Копия ошибки, не ссылающаяся на код единицы, которая её создала.
fn detach(error: StackError) -> StackError {
    StackError::new(GenericError::new(error.status_code(), error.to_string()))
}

/// Вызов фабрики с перехватом паники.
fn guarded<T>(
    name: &str,
    operation: &str,
    f: impl FnOnce() -> GatemeshResult<T>,
) -> GatemeshResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(LoaderError::CreateFailed {
            module: name.to_string(),
            reason: format!("panicked in {operation}"),
        }
        .into()),
    }
}
