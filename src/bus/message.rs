use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Идентификатор сообщения, генерируется в момент публикации.
pub type MessageId = Uuid;

/// Приоритет сообщения.
///
/// Порядок вариантов задаёт `Ord`: `Low < Medium < High < Urgent`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Неизменяемая единица обмена внутри шины.
///
/// Создаётся только брокером при публикации и дальше живёт в `Arc`:
/// одна копия расходится по всем обработчикам и истории канала.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Канал, в который сообщение было опубликовано.
    pub channel: Arc<str>,
    /// Тип события, например `"comment.created"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Кто опубликовал.
    pub source: String,
    /// Предполагаемый получатель. Только информативно: доставка всё равно
    /// идёт всем подходящим подписчикам.
    pub target: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    /// Принудительно сохранить в истории даже в эфемерном канале.
    pub persistent: bool,
}

/// Параметры низкоуровневой публикации.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub source: String,
    pub target: Option<String>,
    /// `None` означает [`Priority::Medium`].
    pub priority: Option<Priority>,
    pub persistent: bool,
}

/// Параметры рассылки одного сообщения в несколько каналов.
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    pub source: String,
    /// Подписчики, чьи обработчики пропускаются при этой рассылке.
    pub exclude: Vec<String>,
    pub priority: Option<Priority>,
    /// `None` означает только канал `global`.
    pub channels: Option<Vec<String>>,
}

impl Message {
    pub(crate) fn new(
        channel: Arc<str>,
        kind: String,
        payload: Value,
        options: PublishOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            kind,
            source: options.source,
            target: options.target,
            payload,
            created_at: Utc::now(),
            priority: options.priority.unwrap_or_default(),
            persistent: options.persistent,
        }
    }

    /// Адресовано ли сообщение данному подписчику (или всем сразу).
    pub fn is_for(
        &self,
        subscriber: &str,
    ) -> bool {
        self.target.as_deref().map_or(true, |t| t == subscriber)
    }

    /// Сколько времени прошло с момента публикации.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

impl PublishOptions {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_target(
        mut self,
        target: impl Into<String>,
    ) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(
        mut self,
        priority: Priority,
    ) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

impl BroadcastOptions {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn on_channels<I, S>(
        mut self,
        channels: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluding(
        mut self,
        subscriber: impl Into<String>,
    ) -> Self {
        self.exclude.push(subscriber.into());
        self
    }

    pub fn with_priority(
        mut self,
        priority: Priority,
    ) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    fn sample(options: PublishOptions) -> Message {
        Message::new(
            Arc::from("comments"),
            "comment.created".to_string(),
            json!({"text": "hi"}),
            options,
        )
    }

    /// Тест проверяет значения по умолчанию при создании сообщения.
    #[test]
    fn test_message_defaults() {
        let msg = sample(PublishOptions::from_source("editor"));
        assert_eq!(&*msg.channel, "comments");
        assert_eq!(msg.kind, "comment.created");
        assert_eq!(msg.source, "editor");
        assert_eq!(msg.priority, Priority::Medium);
        assert!(msg.target.is_none());
        assert!(!msg.persistent);
    }

    /// Тест проверяет, что каждое сообщение получает уникальный id.
    #[test]
    fn test_message_ids_are_unique() {
        let a = sample(PublishOptions::default());
        let b = sample(PublishOptions::default());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_is_for_target() {
        let broadcast = sample(PublishOptions::default());
        assert!(broadcast.is_for("anyone"));

        let direct = sample(PublishOptions::default().with_target("alice"));
        assert!(direct.is_for("alice"));
        assert!(!direct.is_for("bob"));
    }

    #[test]
    fn test_priority_order_and_names() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::Urgent.as_ref(), "urgent");
        assert_eq!(Priority::from_str("high").unwrap(), Priority::High);
    }

    /// Тест проверяет, что сообщение сериализуется с полем `type`.
    #[test]
    fn test_message_serializes_type_field() {
        let msg = sample(PublishOptions::from_source("editor").with_priority(Priority::High));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "comment.created");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["channel"], "comments");
    }
}
