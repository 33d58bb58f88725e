use tracing_subscriber::EnvFilter;

use super::LoggingConfig;

/// Фильтр событий: `RUST_LOG` имеет приоритет над конфигурацией.
///
/// Конфигурация проверяется в [`LoggingConfig::validate`], поэтому
/// запасной уровень `info` нужен только для некорректного `RUST_LOG`.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid RUST_LOG: {e}"),
        }
    }
    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{directive}': {e}; falling back to 'info'");
        EnvFilter::new("info")
    })
}
