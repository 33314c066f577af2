use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowbus_error::HandlerError;

use super::{HandlerId, MessageId};

/// Служебный сигнал шины, рассылается через `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub enum BusSignal {
    /// Изменение жизненного цикла: инициализация, уничтожение, создание
    /// канала.
    Info(String),
    /// Сбой обработчика.
    Error(HandlerFailure),
}

/// Описание сбоя обработчика.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub handler_id: HandlerId,
    pub subscriber: Arc<str>,
    pub channel: Arc<str>,
    pub message_id: MessageId,
    pub message_type: String,
    pub error: HandlerError,
    /// Сбой произошёл в асинхронной части обработчика.
    pub asynchronous: bool,
    pub at: DateTime<Utc>,
}

impl BusSignal {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
