use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use flowbus_error::BusResult;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use uuid::Uuid;

use super::{
    BroadcastOptions, Broker, BusSignal, Event, EventHandler,
    EventSubscribeOptions, EventSubscription, EventType, Handler, HandlerId, MessageId,
    PublishOptions, SubscribeOptions, Unsubscribe,
};

/// Сессия одного подписчика: те же операции брокера с уже подставленным
/// идентификатором.
///
/// Сессия снимает только подписки, созданные через неё. Подписки с тем же
/// идентификатором из другой сессии или напрямую через `Broker` она не
/// трогает, в том числе при drop.
pub struct Session {
    broker: Broker,
    subscriber_id: Arc<str>,
    /// Обработчики, зарегистрированные через эту сессию.
    owned: Mutex<Vec<HandlerId>>,
    signals: Mutex<broadcast::Receiver<BusSignal>>,
    connected: AtomicBool,
}

impl Broker {
    /// Открывает сессию для подписчика.
    pub fn session(
        &self,
        subscriber_id: &str,
    ) -> Session {
        Session::new(self.clone(), subscriber_id)
    }
}

impl Session {
    pub fn new(
        broker: Broker,
        subscriber_id: &str,
    ) -> Self {
        let signals = Mutex::new(broker.signals());
        Self {
            broker,
            subscriber_id: Arc::from(subscriber_id),
            owned: Mutex::new(Vec::new()),
            signals,
            connected: AtomicBool::new(true),
        }
    }

    /// Сессия со сгенерированным идентификатором `session-<uuid>`.
    pub fn anonymous(broker: Broker) -> Self {
        let id = format!("session-{}", Uuid::new_v4());
        Self::new(broker, &id)
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Флаг для UI: падает в `false` на сбое обработчика и возвращается в
    /// `true` на следующем информационном сигнале. К сети отношения не
    /// имеет.
    pub fn is_connected(&self) -> bool {
        let mut signals = self.signals.lock();
        loop {
            match signals.try_recv() {
                Ok(BusSignal::Error(_)) => self.connected.store(false, Ordering::Relaxed),
                Ok(BusSignal::Info(_)) => self.connected.store(true, Ordering::Relaxed),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        self.connected.load(Ordering::Relaxed)
    }

    pub fn subscribe(
        &self,
        channel: &str,
        handler: Handler,
        options: SubscribeOptions,
    ) -> BusResult<Unsubscribe> {
        let handle = self
            .broker
            .subscribe(&self.subscriber_id, channel, handler, options)?;
        self.owned.lock().push(handle.handler_id());
        Ok(handle)
    }

    pub fn subscribe_to_event<I, T>(
        &self,
        event_types: I,
        handler: EventHandler,
        options: EventSubscribeOptions,
    ) -> BusResult<EventSubscription>
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        let subscription = self.broker.subscribe_to_event(
            &self.subscriber_id,
            event_types,
            handler,
            options,
        )?;
        self.owned.lock().extend(subscription.handler_ids());
        Ok(subscription)
    }

    /// Снимает подписки этой сессии: одну (`handler_id`), все в канале
    /// (`channel`) или все. `true`, если что-то было снято.
    pub fn unsubscribe(
        &self,
        channel: Option<&str>,
        handler_id: Option<HandlerId>,
    ) -> bool {
        let mut owned = self.owned.lock();
        let mut removed = false;
        owned.retain(|&id| {
            if handler_id.is_some_and(|h| h != id) {
                return true;
            }
            let hit = self
                .broker
                .unsubscribe(&self.subscriber_id, channel, Some(id));
            removed |= hit;
            // без канала промах значит, что подписки уже нет
            !hit && channel.is_some()
        });
        removed
    }

    pub fn unsubscribe_all(&self) -> bool {
        self.unsubscribe(None, None)
    }

    /// Активные обработчики этой сессии в порядке регистрации.
    pub fn handlers(&self) -> Vec<HandlerId> {
        let active = self.broker.subscriber_handlers(&self.subscriber_id);
        self.owned
            .lock()
            .iter()
            .copied()
            .filter(|id| active.contains(id))
            .collect()
    }

    /// Публикация от имени сессии: пустой `source` заменяется её
    /// идентификатором.
    pub fn publish(
        &self,
        channel: &str,
        kind: impl Into<String>,
        payload: Value,
        mut options: PublishOptions,
    ) -> BusResult<MessageId> {
        if options.source.is_empty() {
            options.source = self.subscriber_id.to_string();
        }
        self.broker.publish(channel, kind, payload, options)
    }

    pub fn publish_event(
        &self,
        event_type: impl Into<EventType>,
        payload: Value,
    ) -> BusResult<MessageId> {
        self.broker.publish_event(Event::new(
            event_type,
            self.subscriber_id.to_string(),
            payload,
        ))
    }

    pub fn broadcast(
        &self,
        kind: impl Into<String>,
        payload: Value,
        mut options: BroadcastOptions,
    ) -> Vec<MessageId> {
        if options.source.is_empty() {
            options.source = self.subscriber_id.to_string();
        }
        self.broker.broadcast(kind, payload, options)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use flowbus_error::HandlerError;
    use serde_json::json;

    use super::*;
    use crate::{
        bus::{intern, ChannelOptions},
        config::BusConfig,
    };

    fn broker() -> Broker {
        let broker = Broker::with_config(BusConfig::default().without_error_bridge());
        broker.initialize();
        broker
    }

    #[test]
    fn test_publish_uses_session_id_as_source() {
        let broker = broker();
        let session = broker.session("editor-1");

        session
            .publish("global", "doc.saved", json!({}), PublishOptions::default())
            .unwrap();
        session
            .publish(
                "global",
                "doc.saved",
                json!({}),
                PublishOptions::from_source("explicit"),
            )
            .unwrap();

        let sources: Vec<String> = broker
            .get_message_history("global", None)
            .iter()
            .map(|m| m.source.clone())
            .collect();
        assert_eq!(sources, vec!["editor-1", "explicit"]);
    }

    /// Тест проверяет, что drop сессии снимает все её подписки.
    #[test]
    fn test_drop_unsubscribes_everything() {
        let broker = broker();
        {
            let session = broker.session("panel");
            session
                .subscribe("global", Handler::new(|_| Ok(())), SubscribeOptions::default())
                .unwrap();
            session
                .subscribe_to_event(
                    ["export.progress", "ai.suggestion_ready"],
                    EventHandler::new(|_| Ok(())),
                    EventSubscribeOptions::default(),
                )
                .unwrap();
            assert_eq!(session.handlers().len(), 3);
        }
        assert_eq!(broker.active_subscriptions(), 0);
    }

    /// Тест проверяет флаг `is_connected`: сбой обработчика сбрасывает
    /// его, информационный сигнал возвращает.
    #[test]
    fn test_is_connected_follows_signals() {
        let broker = broker();
        let session = broker.session("ui");
        assert!(session.is_connected());

        broker
            .subscribe(
                "faulty",
                "global",
                Handler::new(|_| Err(HandlerError::msg("down"))),
                SubscribeOptions::default(),
            )
            .unwrap();
        broker
            .publish("global", "x", json!({}), PublishOptions::default())
            .unwrap();
        assert!(!session.is_connected());
        // без новых сигналов состояние сохраняется
        assert!(!session.is_connected());

        broker.create_channel("extra", ChannelOptions::ephemeral("e", 1));
        assert!(session.is_connected());
    }

    #[test]
    fn test_publish_event_and_unsubscribe() {
        let broker = broker();
        let session = Session::anonymous(broker.clone());
        assert!(session.subscriber_id().starts_with("session-"));

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let s = seen.clone();
        session
            .subscribe(
                "comments",
                Handler::new(move |m| {
                    s.lock().unwrap().push(m.source.clone());
                    Ok(())
                }),
                SubscribeOptions::default(),
            )
            .unwrap();

        session
            .publish_event("comment.created", json!({"text": "hi"}))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![session.subscriber_id().to_string()]);

        assert!(session.unsubscribe(Some("comments"), None));
        assert!(!session.unsubscribe_all());
    }

    /// Тест проверяет, что идентификаторы анонимных сессий не оседают в
    /// пуле имён после циклов создания и drop.
    #[test]
    fn test_anonymous_sessions_do_not_grow_intern_pool() {
        let broker = broker();
        let mut ids = Vec::new();
        for _ in 0..100 {
            let session = Session::anonymous(broker.clone());
            session
                .subscribe("global", Handler::new(|_| Ok(())), SubscribeOptions::default())
                .unwrap();
            ids.push(session.subscriber_id().to_string());
        }
        broker.destroy();

        assert!(ids.iter().all(|id| !intern::is_interned(id)));
        assert!(intern::is_interned("global"));
        assert_eq!(broker.active_subscriptions(), 0);
    }

    /// Тест проверяет, что drop сессии не снимает подписки с тем же
    /// идентификатором, созданные другой сессией или напрямую брокером.
    #[test]
    fn test_drop_keeps_foreign_handlers_with_same_id() {
        let broker = broker();
        let direct = broker
            .subscribe("shared", "global", Handler::new(|_| Ok(())), SubscribeOptions::default())
            .unwrap();
        let first = broker.session("shared");
        let second = broker.session("shared");
        first
            .subscribe("comments", Handler::new(|_| Ok(())), SubscribeOptions::default())
            .unwrap();
        let kept = second
            .subscribe("comments", Handler::new(|_| Ok(())), SubscribeOptions::default())
            .unwrap();
        assert_eq!(broker.subscriber_handlers("shared").len(), 3);
        assert_eq!(first.handlers().len(), 1);

        assert!(first.unsubscribe(Some("comments"), None));
        assert_eq!(second.handlers(), vec![kept.handler_id()]);

        drop(first);
        drop(second);
        assert_eq!(
            broker.subscriber_handlers("shared"),
            vec![direct.handler_id()]
        );
    }

    #[test]
    fn test_broadcast_excludes_nothing_by_default() {
        let broker = broker();
        let session = broker.session("announcer");
        let ids = session.broadcast(
            "system.maintenance",
            json!({"in": "5m"}),
            BroadcastOptions::default().on_channels(["global", "errors"]),
        );
        assert_eq!(ids.len(), 2);
        assert_eq!(
            broker.get_message_history("errors", None)[0].source,
            "announcer"
        );
    }
}
