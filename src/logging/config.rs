use std::{collections::BTreeMap, path::PathBuf};

use gatemesh_error::{ConfigError, GatemeshResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Формат строки лога.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Период ротации файла лога.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    /// Имена потоков полезны для брокера: `gatemesh-worker-N`.
    pub with_thread_names: bool,
    pub with_line_numbers: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_names: true,
            with_line_numbers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub filename_prefix: String,
    pub rotation: RotationPeriod,
    /// Формат файла задаётся отдельно от консоли; по умолчанию JSON.
    pub format: LogFormat,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            filename_prefix: "gatemesh.log".to_string(),
            rotation: RotationPeriod::Daily,
            format: LogFormat::Json,
        }
    }
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub format: LogFormat,
    /// Уровни для отдельных целей, например `gatemesh::broker = "debug"`.
    pub targets: BTreeMap<String, String>,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            targets: BTreeMap::new(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl LoggingConfig {
    /// Переопределения из окружения: `GATEMESH_LOG_LEVEL`,
    /// `GATEMESH_LOG_FORMAT`, `GATEMESH_LOG_DIR` (включает файловый вывод).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("GATEMESH_LOG_LEVEL") {
            self.level = level.to_ascii_lowercase();
        }
        if let Ok(format) = std::env::var("GATEMESH_LOG_FORMAT") {
            match LogFormat::from_name(&format) {
                Some(format) => self.format = format,
                None => eprintln!("Ignoring unknown GATEMESH_LOG_FORMAT '{format}'"),
            }
        }
        if let Ok(dir) = std::env::var("GATEMESH_LOG_DIR") {
            self.file.dir = PathBuf::from(dir);
            self.file.enabled = true;
        }
    }

    pub fn validate(&self) -> GatemeshResult<()> {
        let level = self.level.to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid {
                reason: format!("unknown log level '{}'", self.level),
            }
            .into());
        }
        if self.file.enabled && self.file.filename_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "file logging requires a filename prefix".to_string(),
            }
            .into());
        }
        let directive = self.build_filter_directive();
        EnvFilter::try_new(&directive).map_err(|e| ConfigError::Invalid {
            reason: format!("invalid log filter '{directive}': {e}"),
        })?;
        Ok(())
    }

    /// Директива для `EnvFilter`: базовый уровень, затем цели по алфавиту.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = self.level.to_ascii_lowercase();
        for (target, level) in &self.targets {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level);
        }
        directive
    }

    pub fn console_enabled(&self) -> bool {
        self.console.enabled
    }

    pub fn file_enabled(&self) -> bool {
        self.file.enabled
    }
}
