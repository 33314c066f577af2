use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{router, BuiltinChannel, Priority};

/// События комментариев.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum CommentEvent {
    #[strum(serialize = "comment.created")]
    Created,
    #[strum(serialize = "comment.updated")]
    Updated,
    #[strum(serialize = "comment.deleted")]
    Deleted,
    #[strum(serialize = "comment.resolved")]
    Resolved,
    #[strum(serialize = "comment.reaction_added")]
    ReactionAdded,
    #[strum(serialize = "comment.mention")]
    Mention,
}

/// События присутствия пользователей.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum UserEvent {
    #[strum(serialize = "user.joined")]
    Joined,
    #[strum(serialize = "user.left")]
    Left,
    #[strum(serialize = "user.presence_changed")]
    PresenceChanged,
    #[strum(serialize = "user.cursor_moved")]
    CursorMoved,
    #[strum(serialize = "user.typing")]
    Typing,
    #[strum(serialize = "user.status_changed")]
    StatusChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum AiEvent {
    #[strum(serialize = "ai.analysis_started")]
    AnalysisStarted,
    #[strum(serialize = "ai.analysis_progress")]
    AnalysisProgress,
    #[strum(serialize = "ai.analysis_completed")]
    AnalysisCompleted,
    #[strum(serialize = "ai.analysis_failed")]
    AnalysisFailed,
    #[strum(serialize = "ai.suggestion_ready")]
    SuggestionReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum ExportEvent {
    #[strum(serialize = "export.started")]
    Started,
    #[strum(serialize = "export.progress")]
    Progress,
    #[strum(serialize = "export.completed")]
    Completed,
    #[strum(serialize = "export.failed")]
    Failed,
    #[strum(serialize = "export.cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum NotificationEvent {
    #[strum(serialize = "notification.created")]
    Created,
    #[strum(serialize = "notification.read")]
    Read,
    #[strum(serialize = "notification.dismissed")]
    Dismissed,
    #[strum(serialize = "notification.cleared")]
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum CollaborationEvent {
    #[strum(serialize = "collaboration.cursor_update")]
    CursorUpdate,
    #[strum(serialize = "collaboration.selection_changed")]
    SelectionChanged,
    #[strum(serialize = "collaboration.document_locked")]
    DocumentLocked,
    #[strum(serialize = "collaboration.document_unlocked")]
    DocumentUnlocked,
    #[strum(serialize = "collaboration.session_started")]
    SessionStarted,
    #[strum(serialize = "collaboration.session_ended")]
    SessionEnded,
}

/// Системные события. `system.error` шина публикует сама при сбоях
/// обработчиков.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum SystemEvent {
    #[strum(serialize = "system.error")]
    Error,
    #[strum(serialize = "system.warning")]
    Warning,
    #[strum(serialize = "system.info")]
    Info,
    #[strum(serialize = "system.maintenance")]
    Maintenance,
    #[strum(serialize = "system.health_check")]
    HealthCheck,
}

/// События внешних интеграций. Своего канала нет, уходят в `global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter)]
pub enum IntegrationEvent {
    #[strum(serialize = "integration.connected")]
    Connected,
    #[strum(serialize = "integration.disconnected")]
    Disconnected,
    #[strum(serialize = "integration.sync_started")]
    SyncStarted,
    #[strum(serialize = "integration.sync_completed")]
    SyncCompleted,
    #[strum(serialize = "integration.sync_failed")]
    SyncFailed,
    #[strum(serialize = "integration.webhook_received")]
    WebhookReceived,
}

/// Тип высокоуровневого события.
///
/// Открытое множество: всё, что не распознано как встроенный тип,
/// становится `Custom` и маршрутизируется по тем же правилам.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Comment(CommentEvent),
    User(UserEvent),
    Ai(AiEvent),
    Export(ExportEvent),
    Notification(NotificationEvent),
    Collaboration(CollaborationEvent),
    System(SystemEvent),
    Integration(IntegrationEvent),
    Custom(String),
}

/// Событие для публикации через `publish_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub payload: Value,
    pub target: Option<String>,
}

macro_rules! impl_from_domain {
    ($($domain:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$domain> for EventType {
                fn from(e: $domain) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from_domain!(
    CommentEvent => Comment,
    UserEvent => User,
    AiEvent => Ai,
    ExportEvent => Export,
    NotificationEvent => Notification,
    CollaborationEvent => Collaboration,
    SystemEvent => System,
    IntegrationEvent => Integration,
);

impl EventType {
    /// Разбирает строку типа. Никогда не падает: неизвестное становится `Custom`.
    pub fn parse(s: &str) -> Self {
        fn known<T: FromStr>(
            s: &str,
            wrap: fn(T) -> EventType,
        ) -> Option<EventType> {
            T::from_str(s).ok().map(wrap)
        }

        known(s, Self::Comment)
            .or_else(|| known(s, Self::User))
            .or_else(|| known(s, Self::Ai))
            .or_else(|| known(s, Self::Export))
            .or_else(|| known(s, Self::Notification))
            .or_else(|| known(s, Self::Collaboration))
            .or_else(|| known(s, Self::System))
            .or_else(|| known(s, Self::Integration))
            .unwrap_or_else(|| Self::Custom(s.to_owned()))
    }

    pub fn custom(s: impl Into<String>) -> Self {
        Self::Custom(s.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Comment(e) => e.as_ref(),
            Self::User(e) => e.as_ref(),
            Self::Ai(e) => e.as_ref(),
            Self::Export(e) => e.as_ref(),
            Self::Notification(e) => e.as_ref(),
            Self::Collaboration(e) => e.as_ref(),
            Self::System(e) => e.as_ref(),
            Self::Integration(e) => e.as_ref(),
            Self::Custom(s) => s,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    pub fn channel(&self) -> BuiltinChannel {
        router::route_channel(self.as_str())
    }

    pub fn priority(&self) -> Priority {
        router::route_priority(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

impl Event {
    pub fn new(
        event_type: impl Into<EventType>,
        source: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            payload,
            target: None,
        }
    }

    pub fn with_target(
        mut self,
        target: impl Into<String>,
    ) -> Self {
        self.target = Some(target.into());
        self
    }
}
