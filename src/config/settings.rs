use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use super::BusConfig;
use crate::{error::SettingsResult, logging::LoggingConfig};

/// Имя файла конфигурации, который ищется в рабочем каталоге.
pub const DEFAULT_CONFIG_FILE: &str = "flowbus";

/// Полная конфигурация приложения.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки из `flowbus.toml` (если есть) и переменных
    /// окружения `FLOWBUS_*`.
    pub fn load() -> SettingsResult<Self> {
        Self::load_from(None)
    }

    /// Порядок источников: значения по умолчанию, затем файл, затем
    /// окружение (`FLOWBUS_BUS__REPLAY_LIMIT=5` → `bus.replay_limit`).
    ///
    /// Явно указанный файл обязан существовать.
    pub fn load_from(path: Option<&Path>) -> SettingsResult<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("FLOWBUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.bus.validate()?;
        Ok(settings)
    }
}
