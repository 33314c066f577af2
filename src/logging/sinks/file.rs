use std::io;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{FileRotation, LoggingConfig},
    formatter,
};

/// Файловый layer с ротацией и неблокирующей записью.
///
/// Guard нужно держать, пока живёт приложение: при его drop буфер
/// сбрасывается на диск.
pub fn layer<S>(
    config: &LoggingConfig
) -> io::Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    config.ensure_log_dir()?;

    let dir = &config.log_dir;
    let name = &config.file.filename;
    let appender = match config.file.rotation {
        FileRotation::Hourly => rolling::hourly(dir, name),
        FileRotation::Daily => rolling::daily(dir, name),
        FileRotation::Never => rolling::never(dir, name),
    };
    let (writer, guard) = non_blocking(appender);

    let layer = formatter::build_layer(config.file.format, false, &config.console, writer);
    Ok((layer, guard))
}
