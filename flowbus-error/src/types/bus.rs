use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки операций шины, возвращаемые непосредственно вызывающему.
///
/// Сбои отдельных обработчиков сюда не попадают: они изолируются на
/// границе диспетчеризации (см. [`HandlerError`](crate::HandlerError)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Канал не зарегистрирован
    ChannelNotFound { channel: String },
    /// Невалидное регулярное выражение подписки
    InvalidPattern { pattern: String, reason: String },
}

impl BusError {
    pub fn channel_not_found(channel: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for BusError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::ChannelNotFound { channel } => write!(f, "Channel not found: {channel}"),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid subscription pattern '{pattern}': {reason}")
            }
        }
    }
}

impl std::error::Error for BusError {}

impl ErrorExt for BusError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ChannelNotFound { .. } => StatusCode::NotFound,
            Self::InvalidPattern { .. } => StatusCode::InvalidPattern,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::ChannelNotFound { channel } => format!("Channel not found: {channel}"),
            Self::InvalidPattern { .. } => "Invalid subscription pattern".to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "bus".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::ChannelNotFound { channel } => {
                tags.push(("channel", channel.clone()));
            }
            Self::InvalidPattern { pattern, .. } => {
                tags.push(("pattern", pattern.clone()));
            }
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_not_found() {
        let err = BusError::channel_not_found("orders");
        assert_eq!(err.status_code(), StatusCode::NotFound);
        assert_eq!(err.to_string(), "Channel not found: orders");
        assert!(err
            .metrics_tags()
            .iter()
            .any(|(k, v)| k == &"channel" && v == "orders"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = BusError::InvalidPattern {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::InvalidPattern);
        assert!(err.to_string().contains("unclosed group"));
        assert_eq!(err.client_message(), "Invalid subscription pattern");
    }
}
