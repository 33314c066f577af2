use std::{
    collections::HashMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use flowbus_error::{BusError, HandlerError};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::{broker::WeakBroker, Message, Priority};

/// Future асинхронного обработчика. Шина его не дожидается.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'static>>;

/// Предикат, решающий, вызывать ли обработчик для сообщения.
pub type MessageFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

type HandlerFn = dyn Fn(Arc<Message>) -> Result<Invocation, HandlerError> + Send + Sync;
type PayloadFn = dyn Fn(&Value) -> Result<Invocation, HandlerError> + Send + Sync;

/// Результат синхронной части вызова обработчика.
pub enum Invocation {
    /// Обработчик завершился синхронно.
    Done,
    /// Обработчик вернул незавершённую работу.
    Pending(HandlerFuture),
}

/// Обработчик сообщений канала.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

/// Обработчик высокоуровневых событий: получает только payload.
#[derive(Clone)]
pub struct EventHandler {
    inner: Arc<PayloadFn>,
}

/// Уникальный идентификатор подписки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HandlerId(pub(crate) u64);

/// Откуда брать паттерн подписки: строка с регулярным выражением
/// или уже собранный [`Regex`].
#[derive(Debug, Clone)]
pub enum PatternSource {
    Text(String),
    Compiled(Regex),
}

/// Скомпилированный паттерн, проверяется против `Message::kind`.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `.*` совпадает со всем, регулярку не гоняем.
    Any,
    Regex(Regex),
}

/// Параметры подписки.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// По умолчанию `.*`.
    pub pattern: Option<PatternSource>,
    pub filter: Option<MessageFilter>,
    /// Удалить подписку после первого успешного вызова.
    pub once: bool,
    /// Подсказка, на порядок доставки не влияет.
    pub priority: Priority,
}

/// Параметры подписки на высокоуровневые события.
#[derive(Clone, Default)]
pub struct EventSubscribeOptions {
    pub filter: Option<MessageFilter>,
    pub once: bool,
}

/// Активная подписка.
pub struct Subscription {
    pub(crate) id: HandlerId,
    pub(crate) subscriber: Arc<str>,
    pub(crate) channel: Arc<str>,
    pattern: Pattern,
    filter: Option<MessageFilter>,
    handler: Handler,
    once: bool,
    priority: Priority,
    /// Захват `once`-подписки на время вызова.
    claimed: AtomicBool,
    removed: AtomicBool,
}

/// Реестр подписок: по id, по каналу (в порядке регистрации) и по
/// владельцу.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    by_id: HashMap<HandlerId, Arc<Subscription>>,
    by_channel: HashMap<Arc<str>, Vec<Arc<Subscription>>>,
    by_subscriber: HashMap<Arc<str>, Vec<HandlerId>>,
}

/// Дескриптор отписки одного обработчика.
///
/// Drop дескриптора подписку НЕ снимает.
pub struct Unsubscribe {
    pub(crate) broker: WeakBroker,
    pub(crate) subscriber: Arc<str>,
    pub(crate) channel: Arc<str>,
    pub(crate) handler_id: HandlerId,
}

/// Комбинированный дескриптор для `subscribe_to_event`.
#[derive(Debug)]
pub struct EventSubscription {
    pub(crate) handles: Vec<Unsubscribe>,
}

////////////////////////////////////////////////////////////////////////////////
// Handler / EventHandler
////////////////////////////////////////////////////////////////////////////////

impl Handler {
    /// Синхронный обработчик.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |msg: Arc<Message>| f(&*msg).map(|()| Invocation::Done)),
        }
    }

    /// Асинхронный обработчик: future запускается в текущем tokio runtime.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |msg: Arc<Message>| -> Result<Invocation, HandlerError> {
                Ok(Invocation::Pending(Box::pin(f(msg))))
            }),
        }
    }

    /// Низкоуровневый конструктор: обработчик сам решает, завершиться
    /// синхронно или вернуть future.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Arc<Message>) -> Result<Invocation, HandlerError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub(crate) fn call(
        &self,
        message: Arc<Message>,
    ) -> Result<Invocation, HandlerError> {
        (self.inner)(message)
    }
}

impl EventHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |payload: &Value| f(payload).map(|()| Invocation::Done)),
        }
    }

    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |payload: &Value| -> Result<Invocation, HandlerError> {
                Ok(Invocation::Pending(Box::pin(f(payload.clone()))))
            }),
        }
    }

    /// Оборачивает в обработчик канала, пропускающий только сообщения
    /// ровно этого типа.
    pub(crate) fn for_event(
        &self,
        event_type: &str,
    ) -> Handler {
        let inner = Arc::clone(&self.inner);
        let event_type = event_type.to_owned();
        Handler::from_fn(move |msg: Arc<Message>| {
            if msg.kind == event_type {
                inner(&msg.payload)
            } else {
                Ok(Invocation::Done)
            }
        })
    }
}

impl fmt::Debug for Handler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}

impl fmt::Display for HandlerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Паттерны
////////////////////////////////////////////////////////////////////////////////

impl From<&str> for PatternSource {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for PatternSource {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Regex> for PatternSource {
    fn from(re: Regex) -> Self {
        Self::Compiled(re)
    }
}

impl Pattern {
    /// Компилирует паттерн один раз, при подписке.
    pub fn compile(source: PatternSource) -> Result<Self, BusError> {
        match source {
            PatternSource::Text(text) if text == ".*" => Ok(Self::Any),
            PatternSource::Text(text) => Regex::new(&text)
                .map(Self::Regex)
                .map_err(|e| BusError::InvalidPattern {
                    pattern: text,
                    reason: e.to_string(),
                }),
            PatternSource::Compiled(re) => Ok(Self::Regex(re)),
        }
    }

    pub fn is_match(
        &self,
        kind: &str,
    ) -> bool {
        match self {
            Self::Any => true,
            Self::Regex(re) => re.is_match(kind),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => ".*",
            Self::Regex(re) => re.as_str(),
        }
    }
}

impl SubscribeOptions {
    pub fn pattern(
        mut self,
        pattern: impl Into<PatternSource>,
    ) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn filter<F>(
        mut self,
        filter: F,
    ) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn priority(
        mut self,
        priority: Priority,
    ) -> Self {
        self.priority = priority;
        self
    }
}

impl EventSubscribeOptions {
    pub fn filter<F>(
        mut self,
        filter: F,
    ) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Subscription
////////////////////////////////////////////////////////////////////////////////

impl Subscription {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: HandlerId,
        subscriber: Arc<str>,
        channel: Arc<str>,
        pattern: Pattern,
        filter: Option<MessageFilter>,
        handler: Handler,
        once: bool,
        priority: Priority,
    ) -> Self {
        Self {
            id,
            subscriber,
            channel,
            pattern,
            filter,
            handler,
            once,
            priority,
            claimed: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_active(&self) -> bool {
        !self.removed.load(Ordering::Acquire)
    }

    /// Паттерн совпал с типом и фильтр (если есть) пропустил сообщение.
    pub fn accepts(
        &self,
        message: &Message,
    ) -> bool {
        self.is_active()
            && self.pattern.is_match(&message.kind)
            && self.filter.as_ref().map_or(true, |f| f(message))
    }

    /// Захватывает подписку перед вызовом. Для `once` не больше одного
    /// вызова одновременно и ни одного после успешного.
    pub(crate) fn try_claim(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        if !self.once {
            return true;
        }
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Неудачный вызов `once`-подписки возвращает её в строй.
    pub(crate) fn release(&self) {
        if self.once {
            self.claimed.store(false, Ordering::Release);
        }
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber)
            .field("channel", &self.channel)
            .field("pattern", &self.pattern.as_str())
            .field("once", &self.once)
            .field("priority", &self.priority)
            .field("active", &self.is_active())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// HandlerRegistry
////////////////////////////////////////////////////////////////////////////////

impl HandlerRegistry {
    pub(crate) fn insert(
        &mut self,
        subscription: Arc<Subscription>,
    ) {
        self.by_channel
            .entry(subscription.channel.clone())
            .or_default()
            .push(subscription.clone());
        self.by_subscriber
            .entry(subscription.subscriber.clone())
            .or_default()
            .push(subscription.id);
        self.by_id.insert(subscription.id, subscription);
    }

    /// Подписки канала в порядке регистрации.
    pub(crate) fn for_channel(
        &self,
        channel: &str,
    ) -> &[Arc<Subscription>] {
        self.by_channel
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Удаляет подписки владельца: одну по id, все в канале или все вообще.
    pub(crate) fn remove_matching(
        &mut self,
        subscriber: &str,
        channel: Option<&str>,
        handler: Option<HandlerId>,
    ) -> Vec<Arc<Subscription>> {
        let Some(ids) = self.by_subscriber.get(subscriber) else {
            return Vec::new();
        };
        let doomed: Vec<HandlerId> = ids
            .iter()
            .copied()
            .filter(|id| handler.map_or(true, |h| h == *id))
            .filter(|id| {
                channel.map_or(true, |c| {
                    self.by_id.get(id).is_some_and(|s| &*s.channel == c)
                })
            })
            .collect();

        doomed.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Удаляет все подписки канала.
    pub(crate) fn remove_channel(
        &mut self,
        channel: &str,
    ) -> Vec<Arc<Subscription>> {
        let ids: Vec<HandlerId> = self.for_channel(channel).iter().map(|s| s.id).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub(crate) fn remove(
        &mut self,
        id: HandlerId,
    ) -> Option<Arc<Subscription>> {
        let subscription = self.by_id.remove(&id)?;
        subscription.mark_removed();

        if let Some(list) = self.by_channel.get_mut(&*subscription.channel) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                self.by_channel.remove(&*subscription.channel);
            }
        }
        if let Some(ids) = self.by_subscriber.get_mut(&*subscription.subscriber) {
            ids.retain(|h| *h != id);
            if ids.is_empty() {
                self.by_subscriber.remove(&*subscription.subscriber);
            }
        }
        Some(subscription)
    }

    /// Остались ли у владельца подписки в канале.
    pub(crate) fn has_subscriber_in(
        &self,
        subscriber: &str,
        channel: &str,
    ) -> bool {
        self.for_channel(channel)
            .iter()
            .any(|s| &*s.subscriber == subscriber)
    }

    pub(crate) fn handler_ids(
        &self,
        subscriber: &str,
    ) -> Vec<HandlerId> {
        self.by_subscriber.get(subscriber).cloned().unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn clear(&mut self) {
        for subscription in self.by_id.values() {
            subscription.mark_removed();
        }
        self.by_id.clear();
        self.by_channel.clear();
        self.by_subscriber.clear();
    }
}

////////////////////////////////////////////////////////////////////////////////
// Дескрипторы отписки
////////////////////////////////////////////////////////////////////////////////

impl Unsubscribe {
    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Снимает подписку. `false`, если её уже нет (или шина уничтожена).
    pub fn unsubscribe(self) -> bool {
        self.broker.upgrade().is_some_and(|broker| {
            broker.unsubscribe(
                &self.subscriber,
                Some(&*self.channel),
                Some(self.handler_id),
            )
        })
    }
}

impl EventSubscription {
    pub fn handler_ids(&self) -> Vec<HandlerId> {
        self.handles.iter().map(Unsubscribe::handler_id).collect()
    }

    /// Снимает все подписки. `true`, если снята хотя бы одна.
    pub fn unsubscribe(self) -> bool {
        self.handles
            .into_iter()
            .fold(false, |any, handle| handle.unsubscribe() || any)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("subscriber", &self.subscriber)
            .field("channel", &self.channel)
            .field("handler_id", &self.handler_id)
            .finish()
    }
}
