//! Логирование на `tracing`: фильтр уровней, консоль и файл с ротацией.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig, RotationPeriod};
use gatemesh_error::{GatemeshResult, GenericError, StackError, StatusCode};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, registry::Registry, util::SubscriberInitExt};

/// Устанавливает глобальный subscriber.
///
/// Переменные `GATEMESH_LOG_*` применяются поверх `config`, `RUST_LOG`
/// имеет приоритет над уровнем. Повторная инициализация возвращает ошибку.
pub fn init_logging(mut config: LoggingConfig) -> GatemeshResult<LoggingHandle> {
    config.apply_env_overrides();
    config.validate()?;

    let mut layers: Vec<formatter::BoxedLayer<Registry>> = Vec::new();
    if config.console_enabled() {
        layers.push(sinks::console::layer(&config));
    }
    let file_guard = if config.file_enabled() {
        let (layer, guard) = sinks::file::layer(&config)?;
        layers.push(layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filters::build_filter(&config))
        .try_init()
        .map_err(|e| {
            StackError::new(GenericError::new(
                StatusCode::Internal,
                format!("logging already initialized: {e}"),
            ))
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = ?config.format,
        console = config.console_enabled(),
        file = config.file_enabled(),
        "Logging initialized"
    );
    Ok(LoggingHandle::new(file_guard))
}
