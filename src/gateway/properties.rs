use std::path::{Path, PathBuf};

use gatemesh_error::{ConfigError, GatemeshResult, LoaderError, ResultExt};
use serde::{Deserialize, Serialize};

use crate::modules::{EntryDescriptor, LoaderKind};

/// Какой загрузчик использовать для модуля и что ему передать.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderBinding {
    pub kind: LoaderKind,
    pub entrypoint: EntryDescriptor,
}

impl LoaderBinding {
    pub fn dynamic(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: LoaderKind::Dynamic,
            entrypoint: EntryDescriptor::Path(path.into()),
        }
    }

    pub fn static_symbol(symbol: impl Into<String>) -> Self {
        Self {
            kind: LoaderKind::Static,
            entrypoint: EntryDescriptor::Symbol(symbol.into()),
        }
    }
}

/// Запись модуля: идентичность, загрузчик и непрозрачные аргументы.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEntry {
    pub name: String,
    pub loader: LoaderBinding,
    pub args: serde_json::Value,
}

impl ModuleEntry {
    pub fn new(
        name: impl Into<String>,
        loader: LoaderBinding,
        args: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            loader,
            args,
        }
    }
}

/// Направленная связь: сообщения `source` доставляются `sink`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    pub source: String,
    pub sink: String,
}

impl Link {
    pub fn new(
        source: impl Into<String>,
        sink: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            sink: sink.into(),
        }
    }
}

/// Описание графа: список модулей и список связей.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayProperties {
    pub modules: Vec<ModuleEntry>,
    pub links: Vec<Link>,
}

impl GatewayProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(
        mut self,
        entry: ModuleEntry,
    ) -> Self {
        self.modules.push(entry);
        self
    }

    pub fn link(
        mut self,
        source: impl Into<String>,
        sink: impl Into<String>,
    ) -> Self {
        self.links.push(Link::new(source, sink));
        self
    }

    /// Разбирает JSON-описание шлюза:
    ///
    /// ```json
    /// {
    ///   "modules": [
    ///     { "name": "hb", "loader": { "name": "static", "entrypoint": { "symbol": "heartbeat" } },
    ///       "args": { "interval_ms": 500 } },
    ///     { "name": "sensor", "loader": { "name": "native",
    ///       "entrypoint": { "module.path": "libsensor.so" } } }
    ///   ],
    ///   "links": [ { "source": "hb", "sink": "sensor" } ]
    /// }
    /// ```
    pub fn from_json(text: &str) -> GatemeshResult<Self> {
        let raw: RawGateway = serde_json::from_str(text).map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        raw.into_properties()
    }

    pub fn from_value(value: serde_json::Value) -> GatemeshResult<Self> {
        let raw: RawGateway = serde_json::from_value(value).map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        raw.into_properties()
    }

    pub fn from_file(path: impl AsRef<Path>) -> GatemeshResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading gateway description {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGateway {
    #[serde(default)]
    modules: Vec<RawModule>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModule {
    name: String,
    loader: RawLoader,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLoader {
    name: String,
    #[serde(default)]
    entrypoint: Option<RawEntrypoint>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntrypoint {
    #[serde(rename = "module.path", default)]
    module_path: Option<PathBuf>,
    #[serde(default)]
    symbol: Option<String>,
}

impl RawGateway {
    fn into_properties(self) -> GatemeshResult<GatewayProperties> {
        let modules = self
            .modules
            .into_iter()
            .map(RawModule::into_entry)
            .collect::<GatemeshResult<Vec<_>>>()?;
        Ok(GatewayProperties {
            modules,
            links: self.links,
        })
    }
}

impl RawModule {
    fn into_entry(self) -> GatemeshResult<ModuleEntry> {
        let kind = LoaderKind::from_name(&self.loader.name).ok_or_else(|| {
            LoaderError::UnknownLoader {
                loader: self.loader.name.clone(),
            }
        })?;
        let entrypoint = self.loader.entrypoint.unwrap_or(RawEntrypoint {
            module_path: None,
            symbol: None,
        });

        let loader = match kind {
            LoaderKind::Dynamic => {
                let path = entrypoint.module_path.ok_or_else(|| ConfigError::Invalid {
                    reason: format!(
                        "module '{}': {} loader requires entrypoint \"module.path\"",
                        self.name, self.loader.name
                    ),
                })?;
                LoaderBinding::dynamic(path)
            }
            // Без явного символа статический модуль ищется по своему имени.
            LoaderKind::Static => {
                LoaderBinding::static_symbol(entrypoint.symbol.unwrap_or_else(|| self.name.clone()))
            }
        };

        Ok(ModuleEntry {
            name: self.name,
            loader,
            args: self.args,
        })
    }
}
