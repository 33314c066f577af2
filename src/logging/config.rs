use std::{env, fs, io, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use tracing_subscriber::EnvFilter;

use crate::error::{SettingsError, SettingsResult};

/// Формат вывода логов.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Период ротации файла логов.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub filename: String,
    pub rotation: FileRotation,
    pub format: LogFormat,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень (`info`) или полная директива `EnvFilter`
    /// (`warn,flowbus::bus=trace`).
    pub level: String,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "flowbus.log".to_string(),
            rotation: FileRotation::Daily,
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Переопределения из окружения: `FLOWBUS_LOG_LEVEL`,
    /// `FLOWBUS_LOG_FORMAT`, `FLOWBUS_LOG_DIR`. Некорректный формат
    /// игнорируется.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("FLOWBUS_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = env::var("FLOWBUS_LOG_FORMAT")
            .ok()
            .and_then(|f| LogFormat::from_str(&f).ok())
        {
            self.format = format;
        }
        if let Ok(dir) = env::var("FLOWBUS_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> SettingsResult<()> {
        let directive = self.build_filter_directive();
        EnvFilter::try_new(&directive)
            .map_err(|e| SettingsError::invalid("logging.level", format!("'{directive}': {e}")))?;

        if self.file.enabled && self.file.filename.trim().is_empty() {
            return Err(SettingsError::invalid(
                "logging.file.filename",
                "must not be empty when file logging is enabled",
            ));
        }
        Ok(())
    }

    /// Простой уровень применяется к крейту, для остальных `warn`.
    /// Полная директива передаётся как есть.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') || level.contains(',') {
            level.to_string()
        } else {
            format!("warn,flowbus={level}")
        }
    }

    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file.enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    pub fn file_path(&self) -> PathBuf {
        self.log_dir.join(&self.file.filename)
    }
}
