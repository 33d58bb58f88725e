use tracing_subscriber::registry::LookupSpan;

use crate::logging::{
    formatter::{build_layer, BoxedLayer},
    LoggingConfig,
};

/// Консольный слой: stdout, формат из [`LoggingConfig::format`].
pub fn layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    build_layer(config.format, &config.console, std::io::stdout)
}
