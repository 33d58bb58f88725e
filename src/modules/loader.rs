use std::{
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use gatemesh_error::{GatemeshResult, LoaderError, StatusCode};

use crate::CodeAnchor;

use super::{DynamicCodeUnit, DynamicLoader, ModuleApi, StaticCodeUnit, StaticLoader};

/// Стратегия загрузки модуля.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    /// Разделяемая библиотека (`.so`/`.dll`/`.dylib`).
    Dynamic,
    /// Фабрика, связанная с исполняемым файлом статически.
    Static,
}

impl LoaderKind {
    /// Разбирает имя загрузчика из описания шлюза. `native` это синоним
    /// `dynamic`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "native" | "dynamic" => Some(Self::Dynamic),
            "static" => Some(Self::Static),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Static => "static",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Что именно загружать: путь к единице кода или имя в статической таблице.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDescriptor {
    Path(PathBuf),
    Symbol(String),
}

impl fmt::Display for EntryDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Symbol(symbol) => write!(f, "static:{symbol}"),
        }
    }
}

/// Загруженная единица кода.
#[derive(Debug)]
pub enum CodeUnit {
    Dynamic(DynamicCodeUnit),
    Static(StaticCodeUnit),
}

impl CodeUnit {
    pub fn kind(&self) -> LoaderKind {
        match self {
            CodeUnit::Dynamic(_) => LoaderKind::Dynamic,
            CodeUnit::Static(_) => LoaderKind::Static,
        }
    }

    /// Владелец кода для сообщений модуля. Статическому коду он не нужен.
    pub fn anchor(&self) -> Option<CodeAnchor> {
        match self {
            CodeUnit::Dynamic(unit) => Some(unit.anchor()),
            CodeUnit::Static(_) => None,
        }
    }

    pub fn descriptor(&self) -> EntryDescriptor {
        match self {
            CodeUnit::Dynamic(unit) => EntryDescriptor::Path(unit.path().to_path_buf()),
            CodeUnit::Static(unit) => EntryDescriptor::Symbol(unit.symbol().to_string()),
        }
    }
}

/// Счётчики загрузок и выгрузок одного загрузчика.
#[derive(Debug, Default)]
pub struct LoaderStats {
    loaded: AtomicUsize,
    unloaded: AtomicUsize,
}

/// Снимок [`LoaderStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderCounters {
    pub loaded: usize,
    pub unloaded: usize,
}

impl LoaderStats {
    pub(crate) fn record_load(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unload(&self) {
        self.unloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoaderCounters {
        LoaderCounters {
            loaded: self.loaded.load(Ordering::Relaxed),
            unloaded: self.unloaded.load(Ordering::Relaxed),
        }
    }
}

impl LoaderCounters {
    /// Единицы кода, которые загружены и ещё не выгружены.
    pub fn live(&self) -> usize {
        self.loaded.saturating_sub(self.unloaded)
    }
}

/// Закрытое множество стратегий загрузки.
///
/// Стратегия выбирается для каждой записи модуля отдельно, так что
/// статические и динамические модули сосуществуют в одном шлюзе.
pub enum Loader {
    Dynamic(DynamicLoader),
    Static(StaticLoader),
}

impl Loader {
    pub fn kind(&self) -> LoaderKind {
        match self {
            Loader::Dynamic(_) => LoaderKind::Dynamic,
            Loader::Static(_) => LoaderKind::Static,
        }
    }

    /// Разрешает дескриптор в единицу кода.
    pub fn load(
        &self,
        entry: &EntryDescriptor,
    ) -> GatemeshResult<CodeUnit> {
        match self {
            Loader::Dynamic(l) => l.load(entry).map(CodeUnit::Dynamic),
            Loader::Static(l) => l.load(entry).map(CodeUnit::Static),
        }
    }

    /// Достаёт таблицу API из загруженной единицы.
    pub fn get_api(
        &self,
        unit: &CodeUnit,
    ) -> GatemeshResult<ModuleApi> {
        match (self, unit) {
            (Loader::Dynamic(l), CodeUnit::Dynamic(u)) => l.get_api(u),
            (Loader::Static(l), CodeUnit::Static(u)) => l.get_api(u),
            (loader, unit) => gatemesh_error::bail!(
                StatusCode::Internal,
                "{} loader cannot handle a {} code unit",
                loader.kind(),
                unit.kind()
            ),
        }
    }

    /// Выгружает единицу кода. Вызывающий гарантирует, что `destroy`
    /// модуля уже завершён и фабрика освобождена.
    pub fn unload(
        &self,
        unit: CodeUnit,
    ) -> GatemeshResult<()> {
        match (self, unit) {
            (Loader::Dynamic(l), CodeUnit::Dynamic(u)) => l.unload(u),
            (Loader::Static(l), CodeUnit::Static(u)) => l.unload(u),
            (loader, unit) => Err(LoaderError::Unload {
                entry: unit.descriptor().to_string(),
                reason: format!("unit does not belong to the {} loader", loader.kind()),
            }
            .into()),
        }
    }

    pub fn stats(&self) -> LoaderCounters {
        match self {
            Loader::Dynamic(l) => l.stats(),
            Loader::Static(l) => l.stats(),
        }
    }
}

impl From<DynamicLoader> for Loader {
    fn from(loader: DynamicLoader) -> Self {
        Loader::Dynamic(loader)
    }
}

impl From<StaticLoader> for Loader {
    fn from(loader: StaticLoader) -> Self {
        Loader::Static(loader)
    }
}

/// Набор загрузчиков, передаваемый шлюзу явно (без глобального реестра).
/// На каждый вид не больше одного загрузчика.
#[derive(Default)]
pub struct Loaders {
    loaders: Vec<Loader>,
}

impl Loaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет загрузчик, заменяя уже имеющийся того же вида.
    pub fn with(
        mut self,
        loader: impl Into<Loader>,
    ) -> Self {
        let loader = loader.into();
        self.loaders.retain(|l| l.kind() != loader.kind());
        self.loaders.push(loader);
        self
    }

    pub fn get(
        &self,
        kind: LoaderKind,
    ) -> GatemeshResult<&Loader> {
        self.loaders
            .iter()
            .find(|l| l.kind() == kind)
            .ok_or_else(|| {
                LoaderError::UnknownLoader {
                    loader: kind.to_string(),
                }
                .into()
            })
    }

    pub fn kinds(&self) -> Vec<LoaderKind> {
        self.loaders.iter().map(Loader::kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}
