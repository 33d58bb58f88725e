use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use gatemesh_error::{GatemeshResult, LoaderError};
use libloading::{Library, Symbol};
use tracing::{debug, trace};

use crate::CodeAnchor;

use super::{
    ApiVersion, EntryDescriptor, LoaderCounters, LoaderStats, ModuleApi, ModuleApiEntry, ABI_TAG,
    MODULE_ABI_SYMBOL, MODULE_API_SYMBOL,
};

/// Загрузчик разделяемых библиотек через `libloading`.
///
/// Библиотека должна быть собрана тем же компилятором и против той же
/// версии `gatemesh`, что и хост (см. [`crate::export_module`]): между
/// хостом и плагином передаются Rust-объекты, а не C ABI. Версия крейта
/// сверяется по символу `GATEMESH_MODULE_ABI`, версия контракта по
/// возвращённой таблице.
#[derive(Debug, Clone, Default)]
pub struct DynamicLoader {
    search_dirs: Vec<PathBuf>,
    stats: Arc<LoaderStats>,
}

/// Открытая разделяемая библиотека.
///
/// Библиотека разделяется с сообщениями, которые опубликовал её модуль:
/// их буферы освобождает код библиотеки. Закрывается она вместе с
/// последней ссылкой.
#[derive(Debug)]
pub struct DynamicCodeUnit {
    path: PathBuf,
    library: Arc<Library>,
}

impl DynamicCodeUnit {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ссылка на библиотеку для привязки сообщений.
    pub fn anchor(&self) -> CodeAnchor {
        Arc::clone(&self.library) as CodeAnchor
    }
}

impl DynamicLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет каталог поиска для относительных путей.
    pub fn with_search_dir(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    fn resolve(
        &self,
        path: &Path,
    ) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(path))
            .chain(std::iter::once(path.to_path_buf()))
            .find(|candidate| candidate.is_file())
    }

    pub fn load(
        &self,
        entry: &EntryDescriptor,
    ) -> GatemeshResult<DynamicCodeUnit> {
        let EntryDescriptor::Path(path) = entry else {
            return Err(LoaderError::Load {
                entry: entry.to_string(),
                reason: "dynamic loader expects a code unit path".to_string(),
            }
            .into());
        };

        let resolved = self.resolve(path).ok_or_else(|| LoaderError::ModuleNotFound {
            entry: path.display().to_string(),
        })?;

        // SAFETY: открытие библиотеки исполняет её инициализаторы. Модули
        // доверенные и размещены вместе со шлюзом.
        let library = unsafe { Library::new(&resolved) }.map_err(|e| LoaderError::Load {
            entry: resolved.display().to_string(),
            reason: e.to_string(),
        })?;

        self.stats.record_load();
        debug!(path = %resolved.display(), "Loaded dynamic code unit");
        Ok(DynamicCodeUnit {
            path: resolved,
            library: Arc::new(library),
        })
    }

    pub fn get_api(
        &self,
        unit: &DynamicCodeUnit,
    ) -> GatemeshResult<ModuleApi> {
        let entry = unit.path.display().to_string();
        let incompatible = |reason: String| LoaderError::IncompatibleApi {
            entry: entry.clone(),
            reason,
        };

        // SAFETY: символ объявлен макросом `export_module!` как
        // `static &str`; строка живёт, пока открыта библиотека, и не
        // используется после выхода из функции.
        let tag: &str = unsafe {
            let symbol: Symbol<*const &str> = unit
                .library
                .get(MODULE_ABI_SYMBOL)
                .map_err(|e| incompatible(format!("missing ABI tag: {e}")))?;
            **symbol
        };
        if tag != ABI_TAG {
            return Err(incompatible(format!("built against {tag}, host is {ABI_TAG}")).into());
        }

        // SAFETY: ABI-метка совпала, значит символ сгенерирован тем же
        // `export_module!` и имеет сигнатуру `ModuleApiEntry`. Возвращённый
        // указатель получен из `Box::into_raw` в том же аллокаторе.
        let api = unsafe {
            let constructor: Symbol<ModuleApiEntry> = unit
                .library
                .get(MODULE_API_SYMBOL)
                .map_err(|e| incompatible(format!("missing entry point: {e}")))?;
            let raw = constructor(ApiVersion::CURRENT.as_u32());
            if raw.is_null() {
                return Err(incompatible(format!(
                    "module requires an API newer than {}",
                    ApiVersion::CURRENT
                ))
                .into());
            }
            *Box::from_raw(raw)
        };

        if api.version() > ApiVersion::CURRENT {
            return Err(incompatible(format!(
                "module reports API {}, host supports up to {}",
                api.version(),
                ApiVersion::CURRENT
            ))
            .into());
        }
        trace!(path = %entry, version = %api.version(), "Resolved module API");
        Ok(api)
    }

    pub fn unload(
        &self,
        unit: DynamicCodeUnit,
    ) -> GatemeshResult<()> {
        let DynamicCodeUnit { path, library } = unit;
        self.stats.record_unload();
        match Arc::try_unwrap(library) {
            Ok(library) => {
                library.close().map_err(|e| LoaderError::Unload {
                    entry: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                debug!(path = %path.display(), "Unloaded dynamic code unit");
            }
            Err(shared) => {
                debug!(
                    path = %path.display(),
                    messages = Arc::strong_count(&shared) - 1,
                    "Code unit still referenced by live messages; closing with the last one"
                );
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> LoaderCounters {
        self.stats.snapshot()
    }
}
