use std::{collections::HashMap, fmt, sync::Arc};

use gatemesh_error::{GatemeshResult, LoaderError};
use tracing::trace;

use super::{EntryDescriptor, LoaderCounters, LoaderStats, ModuleApi};

/// Функция, возвращающая таблицу API статически связанного модуля.
pub type StaticEntry = Arc<dyn Fn() -> ModuleApi + Send + Sync>;

/// Загрузчик модулей, связанных с исполняемым файлом.
///
/// Таблица "символ -> фабрика" задаётся при построении; клоны разделяют
/// счётчики загрузок.
#[derive(Clone, Default)]
pub struct StaticLoader {
    table: HashMap<String, StaticEntry>,
    stats: Arc<LoaderStats>,
}

/// "Загруженная" статическая единица: ссылка на функцию из таблицы.
pub struct StaticCodeUnit {
    symbol: String,
    entry: StaticEntry,
}

impl StaticCodeUnit {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Debug for StaticCodeUnit {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StaticCodeUnit")
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует модуль под именем `symbol`.
    pub fn register<F>(
        mut self,
        symbol: impl Into<String>,
        entry: F,
    ) -> Self
    where
        F: Fn() -> ModuleApi + Send + Sync + 'static,
    {
        self.table.insert(symbol.into(), Arc::new(entry));
        self
    }

    pub fn contains(
        &self,
        symbol: &str,
    ) -> bool {
        self.table.contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.table.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn load(
        &self,
        entry: &EntryDescriptor,
    ) -> GatemeshResult<StaticCodeUnit> {
        let EntryDescriptor::Symbol(symbol) = entry else {
            return Err(LoaderError::Load {
                entry: entry.to_string(),
                reason: "static loader expects a symbol name".to_string(),
            }
            .into());
        };
        let found = self
            .table
            .get(symbol)
            .ok_or_else(|| LoaderError::ModuleNotFound {
                entry: entry.to_string(),
            })?;
        self.stats.record_load();
        trace!(symbol = %symbol, "Resolved static module");
        Ok(StaticCodeUnit {
            symbol: symbol.clone(),
            entry: Arc::clone(found),
        })
    }

    pub fn get_api(
        &self,
        unit: &StaticCodeUnit,
    ) -> GatemeshResult<ModuleApi> {
        Ok((unit.entry)())
    }

    pub fn unload(
        &self,
        unit: StaticCodeUnit,
    ) -> GatemeshResult<()> {
        self.stats.record_unload();
        trace!(symbol = %unit.symbol, "Released static module");
        Ok(())
    }

    pub fn stats(&self) -> LoaderCounters {
        self.stats.snapshot()
    }
}
