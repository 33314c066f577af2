use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use strum_macros::{AsRefStr, EnumIter, EnumString, IntoStaticStr};

use super::{HistoryBuffer, Message};

/// Конфигурация канала.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOptions {
    pub description: String,
    /// Хранить ли сообщения для повторной доставки новым подписчикам.
    pub persistent: bool,
    /// Ёмкость истории.
    pub max_history: usize,
}

/// Встроенные каналы, регистрируемые при `initialize()`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr, EnumIter, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinChannel {
    Global,
    Comments,
    Users,
    Ai,
    Collaboration,
    Export,
    Notifications,
    Errors,
}

/// Именованный домен маршрутизации со своей историей.
///
/// Набор подписчиков здесь чисто учётный: доставку он не ограничивает,
/// нужен для интроспекции и для `remove_channel`.
#[derive(Debug)]
pub(crate) struct Channel {
    name: Arc<str>,
    options: ChannelOptions,
    subscribers: BTreeSet<Arc<str>>,
    history: HistoryBuffer,
}

/// Снимок состояния канала для интроспекции.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub description: String,
    pub persistent: bool,
    pub max_history: usize,
    pub subscribers: Vec<String>,
    pub history_len: usize,
    pub handler_count: usize,
}

impl ChannelOptions {
    pub fn persistent(
        description: impl Into<String>,
        max_history: usize,
    ) -> Self {
        Self {
            description: description.into(),
            persistent: true,
            max_history,
        }
    }

    pub fn ephemeral(
        description: impl Into<String>,
        max_history: usize,
    ) -> Self {
        Self {
            description: description.into(),
            persistent: false,
            max_history,
        }
    }
}

impl BuiltinChannel {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn options(self) -> ChannelOptions {
        match self {
            Self::Global => ChannelOptions::persistent("Application-wide messages", 1000),
            Self::Comments => ChannelOptions::persistent("Live comments and reactions", 500),
            Self::Users => ChannelOptions::ephemeral("User presence and activity", 100),
            Self::Ai => ChannelOptions::persistent("AI analysis results", 200),
            Self::Collaboration => {
                ChannelOptions::ephemeral("Cursor and selection updates", 50)
            }
            Self::Export => ChannelOptions::persistent("Export job progress", 100),
            Self::Notifications => ChannelOptions::persistent("User notifications", 200),
            Self::Errors => ChannelOptions::persistent("System errors and warnings", 100),
        }
    }
}

impl Channel {
    pub(crate) fn new(
        name: Arc<str>,
        options: ChannelOptions,
    ) -> Self {
        Self {
            name,
            history: HistoryBuffer::new(options.max_history),
            options,
            subscribers: BTreeSet::new(),
        }
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn is_persistent(&self) -> bool {
        self.options.persistent
    }

    /// Заменяет конфигурацию. Подписчики сохраняются, история
    /// обрезается под новую ёмкость.
    pub(crate) fn reconfigure(
        &mut self,
        options: ChannelOptions,
    ) {
        self.history.set_capacity(options.max_history);
        self.options = options;
    }

    pub(crate) fn add_subscriber(
        &mut self,
        subscriber: Arc<str>,
    ) {
        self.subscribers.insert(subscriber);
    }

    pub(crate) fn remove_subscriber(
        &mut self,
        subscriber: &str,
    ) {
        self.subscribers.remove(subscriber);
    }

    pub(crate) fn subscribers(&self) -> impl Iterator<Item = &Arc<str>> {
        self.subscribers.iter()
    }

    pub(crate) fn record(
        &mut self,
        message: Arc<Message>,
    ) {
        self.history.push(message);
    }

    pub(crate) fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut HistoryBuffer {
        &mut self.history
    }

    pub(crate) fn info(
        &self,
        handler_count: usize,
    ) -> ChannelInfo {
        ChannelInfo {
            name: self.name.to_string(),
            description: self.options.description.clone(),
            persistent: self.options.persistent,
            max_history: self.options.max_history,
            subscribers: self.subscribers.iter().map(|s| s.to_string()).collect(),
            history_len: self.history.len(),
            handler_count,
        }
    }
}
