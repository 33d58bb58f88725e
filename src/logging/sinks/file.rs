use std::fs;

use gatemesh_error::{GatemeshResult, ResultExt};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::registry::LookupSpan;

use crate::logging::{
    config::{ConsoleConfig, RotationPeriod},
    formatter::{build_layer, BoxedLayer},
    LoggingConfig,
};

impl From<RotationPeriod> for Rotation {
    fn from(period: RotationPeriod) -> Self {
        match period {
            RotationPeriod::Minutely => Rotation::MINUTELY,
            RotationPeriod::Hourly => Rotation::HOURLY,
            RotationPeriod::Daily => Rotation::DAILY,
            RotationPeriod::Never => Rotation::NEVER,
        }
    }
}

/// Файловый слой с ротацией и неблокирующей записью.
///
/// Возвращённый guard должен жить до завершения процесса: при его
/// удалении буфер сбрасывается на диск.
pub fn layer<S>(config: &LoggingConfig) -> GatemeshResult<(BoxedLayer<S>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let file = &config.file;
    fs::create_dir_all(&file.dir)
        .with_context(|| format!("creating log directory {}", file.dir.display()))?;

    let appender = RollingFileAppender::new(file.rotation.into(), &file.dir, &file.filename_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // Цвета в файле не нужны.
    let options = ConsoleConfig {
        with_ansi: false,
        ..config.console.clone()
    };
    Ok((build_layer(file.format, &options, writer), guard))
}
