use std::any::Any;

use thiserror::Error;

// Ошибки шины живут в отдельном крейте, здесь только реэкспорт.
pub use flowbus_error::{BusError, BusResult, ErrorExt, HandlerError, LogLevel, StatusCode};

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Ошибки загрузки и проверки конфигурации.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl SettingsError {
    pub fn invalid(
        key: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl ErrorExt for SettingsError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidConfig
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Self::Invalid { key, .. } = self {
            tags.push(("key", key.to_string()));
        }
        tags
    }
}
