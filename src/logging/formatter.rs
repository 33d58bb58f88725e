use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer,
    registry::LookupSpan,
};

use super::{config::ConsoleConfig, LogFormat};

/// Слой, стёртый до trait-объекта, чтобы консоль и файл могли
/// использовать разные форматы.
pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Собирает fmt-слой нужного формата поверх произвольного writer.
pub fn build_layer<S, W>(
    format: LogFormat,
    options: &ConsoleConfig,
    writer: W,
) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(options.with_ansi)
        .with_target(options.with_target)
        .with_thread_names(options.with_thread_names)
        .with_line_number(options.with_line_numbers);

    match format {
        LogFormat::Compact => Box::new(layer.compact()),
        LogFormat::Pretty => Box::new(layer.pretty().with_span_events(FmtSpan::CLOSE)),
        LogFormat::Json => Box::new(layer.json().with_current_span(true)),
    }
}
