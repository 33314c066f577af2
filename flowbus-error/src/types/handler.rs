use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки выполнения обработчика подписчика.
///
/// Никогда не пробрасываются публикатору: шина логирует их, рассылает
/// внутренний сигнал и учитывает в телеметрии.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Обработчик вернул ошибку
    Failed { reason: String },
    /// Обработчик запаниковал
    Panicked { reason: String },
    /// Асинхронный обработчик вызван вне tokio runtime
    NoRuntime,
}

impl HandlerError {
    /// Короткий конструктор для `HandlerError::Failed`.
    pub fn msg(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "Handler failed: {reason}"),
            Self::Panicked { reason } => write!(f, "Handler panicked: {reason}"),
            Self::NoRuntime => write!(f, "Async handler invoked outside of a tokio runtime"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl ErrorExt for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Failed { .. } => StatusCode::HandlerFailed,
            Self::Panicked { .. } => StatusCode::HandlerPanicked,
            Self::NoRuntime => StatusCode::NoAsyncRuntime,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", "handler".to_string()),
            ("status_code", self.status_code().to_string()),
        ]
    }
}
