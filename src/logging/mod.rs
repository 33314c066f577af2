pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

use std::error::Error;

pub use config::{ConsoleConfig, FileConfig, FileRotation, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов вернёт ошибку.
pub fn init_logging(
    mut config: LoggingConfig
) -> Result<LoggingHandle, Box<dyn Error + Send + Sync>> {
    config.apply_env_overrides();
    config.validate()?;

    let env_filter = filters::build_filter(&config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer(&config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer(&config)?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = config.format.as_ref(),
        console_enabled = config.console.enabled,
        file_enabled = config.file.enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    /// Тест проверяет, что глобальный subscriber ставится один раз, а
    /// некорректная конфигурация отклоняется до установки.
    #[test]
    #[serial]
    fn test_init_logging_once() {
        std::env::remove_var("FLOWBUS_LOG_LEVEL");

        let bad = LoggingConfig {
            level: "flowbus=loud".into(),
            ..Default::default()
        };
        assert!(init_logging(bad).is_err());

        let mut cfg = LoggingConfig::default();
        cfg.console.enabled = false;
        let handle = init_logging(cfg.clone()).unwrap();
        assert!(!handle.has_file_sink());

        assert!(init_logging(cfg).is_err());
        handle.shutdown();
    }
}
