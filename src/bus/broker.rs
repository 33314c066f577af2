use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Instant,
};

use chrono::Utc;
use flowbus_error::{BusError, BusResult, HandlerError};
use parking_lot::RwLock;
use serde_json::{json, Value};
use strum::IntoEnumIterator;
use tokio::{runtime::Handle, sync::broadcast};
use tracing::{debug, error, info, warn};

use super::{
    intern::intern_channel, router, BroadcastOptions, BuiltinChannel, BusSignal, Channel, ChannelInfo,
    ChannelOptions, Event, EventHandler, EventSubscribeOptions, EventSubscription, EventType,
    Handler, HandlerFailure, HandlerFuture, HandlerId, HandlerRegistry, HealthStatus, Invocation,
    Message, MessageId, Pattern, PatternSource, PublishOptions, SubscribeOptions, Subscription,
    SystemEvent, Telemetry, TypeMetrics, Unsubscribe,
};
use crate::config::BusConfig;

/// Источник сообщений, которые шина публикует сама.
pub const BUS_SOURCE: &str = "flowbus";

/// Брокер сообщений: реестр каналов, история, подписки и телеметрия.
///
/// Клонирование дешёвое, все клоны разделяют одно состояние. Глобального
/// экземпляра нет: брокер создаётся в корне приложения и передаётся
/// потребителям (или оборачивается в [`Session`](super::Session)).
///
/// Обработчики вызываются синхронно в потоке `publish`, после снятия
/// блокировки реестра, поэтому из обработчика можно публиковать и
/// подписываться.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

/// Слабая ссылка на брокер, её держат дескрипторы отписки и фоновые задачи.
#[derive(Clone)]
pub(crate) struct WeakBroker(Weak<Inner>);

struct Inner {
    state: RwLock<State>,
    telemetry: Telemetry,
    signals: broadcast::Sender<BusSignal>,
    config: BusConfig,
    initialized: AtomicBool,
    bridge_errors: AtomicBool,
    next_handler_id: AtomicU64,
}

#[derive(Default)]
struct State {
    channels: HashMap<Arc<str>, Channel>,
    handlers: HandlerRegistry,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl WeakBroker {
    pub(crate) fn upgrade(&self) -> Option<Broker> {
        self.0.upgrade().map(|inner| Broker { inner })
    }
}

impl Broker {
    /// Создаёт брокер с настройками по умолчанию. Каналов пока нет, см.
    /// [`Broker::initialize`].
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let (signals, _) = broadcast::channel(config.signal_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                telemetry: Telemetry::new(),
                signals,
                initialized: AtomicBool::new(false),
                bridge_errors: AtomicBool::new(false),
                next_handler_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakBroker {
        WeakBroker(Arc::downgrade(&self.inner))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Жизненный цикл
    ////////////////////////////////////////////////////////////////////////////

    /// Регистрирует встроенные каналы и включает мост ошибок. Повторный
    /// вызов ничего не делает.
    pub fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut state = self.inner.state.write();
            for builtin in BuiltinChannel::iter() {
                register_channel(&mut state, builtin.name(), builtin.options());
            }
        }
        self.inner
            .bridge_errors
            .store(self.inner.config.bridge_errors, Ordering::Release);

        info!(
            channels = BuiltinChannel::iter().count(),
            bridge_errors = self.inner.config.bridge_errors,
            "Bus initialized"
        );
        self.signal_info("Bus initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Полный сброс: подписки, каналы, история и телеметрия.
    pub fn destroy(&self) {
        let (channels, handlers) = {
            let mut state = self.inner.state.write();
            let counts = (state.channels.len(), state.handlers.len());
            state.handlers.clear();
            state.channels.clear();
            counts
        };
        self.inner.telemetry.reset();
        self.inner.bridge_errors.store(false, Ordering::Release);
        self.inner.initialized.store(false, Ordering::Release);

        info!(channels, handlers, "Bus destroyed");
        self.signal_info("Bus destroyed");
    }

    ////////////////////////////////////////////////////////////////////////////
    // Каналы
    ////////////////////////////////////////////////////////////////////////////

    /// Регистрирует канал. Если канал уже есть, заменяется только его
    /// конфигурация: подписки сохраняются, история обрезается.
    pub fn create_channel(
        &self,
        name: &str,
        options: ChannelOptions,
    ) {
        let (persistent, max_history) = (options.persistent, options.max_history);
        let replaced = register_channel(&mut self.inner.state.write(), name, options);

        if replaced {
            warn!("Channel {} reconfigured", name);
        } else {
            info!(persistent, max_history, "Channel {} created", name);
        }
        self.signal_info(format!("Channel {name} created"));
    }

    /// Удаляет канал вместе с историей и всеми подписками в нём.
    /// `false`, если канала не было.
    pub fn remove_channel(
        &self,
        name: &str,
    ) -> bool {
        let removed = {
            let mut state = self.inner.state.write();
            let Some(channel) = state.channels.remove(name) else {
                return false;
            };
            let handlers = state.handlers.remove_channel(name).len();
            (channel.subscribers().count(), handlers)
        };

        info!(
            subscribers = removed.0,
            handlers = removed.1,
            "Channel {} removed",
            name
        );
        self.signal_info(format!("Channel {name} removed"));
        true
    }

    pub fn has_channel(
        &self,
        name: &str,
    ) -> bool {
        self.inner.state.read().channels.contains_key(name)
    }

    pub fn get_channel(
        &self,
        name: &str,
    ) -> Option<ChannelInfo> {
        let state = self.inner.state.read();
        state
            .channels
            .get(name)
            .map(|c| c.info(state.handlers.for_channel(name).len()))
    }

    /// Все каналы, отсортированные по имени.
    pub fn list_channels(&self) -> Vec<ChannelInfo> {
        let state = self.inner.state.read();
        let mut list: Vec<ChannelInfo> = state
            .channels
            .values()
            .map(|c| c.info(state.handlers.for_channel(c.name()).len()))
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    ////////////////////////////////////////////////////////////////////////////
    // Публикация
    ////////////////////////////////////////////////////////////////////////////

    /// Публикует сообщение в канал и синхронно вызывает подходящие
    /// обработчики в порядке подписки.
    ///
    /// Ошибка возвращается только если канал не зарегистрирован; в этом
    /// случае ничего не записывается. Сбои обработчиков изолируются.
    pub fn publish(
        &self,
        channel: &str,
        kind: impl Into<String>,
        payload: Value,
        options: PublishOptions,
    ) -> BusResult<MessageId> {
        self.dispatch(channel, kind.into(), payload, options, &[])
    }

    /// Публикует высокоуровневое событие: канал и приоритет выводятся из
    /// типа.
    pub fn publish_event(
        &self,
        event: Event,
    ) -> BusResult<MessageId> {
        let kind = event.event_type.as_str();
        let channel = router::route_channel(kind);
        let options = PublishOptions {
            source: event.source,
            target: event.target,
            priority: Some(router::route_priority(kind)),
            persistent: false,
        };
        self.dispatch(
            channel.name(),
            event.event_type.to_string(),
            event.payload,
            options,
            &[],
        )
    }

    /// Публикует сообщение в несколько каналов (по умолчанию `global`).
    ///
    /// Неудача в одном канале логируется и пропускается. Обработчики
    /// подписчиков из `exclude` не вызываются.
    pub fn broadcast(
        &self,
        kind: impl Into<String>,
        payload: Value,
        options: BroadcastOptions,
    ) -> Vec<MessageId> {
        let kind = kind.into();
        let channels = options
            .channels
            .unwrap_or_else(|| vec![BuiltinChannel::Global.name().to_string()]);

        let mut ids = Vec::with_capacity(channels.len());
        for channel in &channels {
            let publish = PublishOptions {
                source: options.source.clone(),
                target: None,
                priority: options.priority,
                persistent: false,
            };
            match self.dispatch(
                channel,
                kind.clone(),
                payload.clone(),
                publish,
                &options.exclude,
            ) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Broadcast of {} to {} skipped: {}", kind, channel, e),
            }
        }
        ids
    }

    fn dispatch(
        &self,
        channel: &str,
        kind: String,
        payload: Value,
        options: PublishOptions,
        exclude: &[String],
    ) -> BusResult<MessageId> {
        let started = Instant::now();

        let (message, targets) = {
            let mut guard = self.inner.state.write();
            let State { channels, handlers } = &mut *guard;
            let ch = channels
                .get_mut(channel)
                .ok_or_else(|| BusError::channel_not_found(channel))?;

            let message = Arc::new(Message::new(ch.name().clone(), kind, payload, options));
            if ch.is_persistent() || message.persistent {
                ch.record(Arc::clone(&message));
            }

            let targets: Vec<Arc<Subscription>> = handlers
                .for_channel(channel)
                .iter()
                .filter(|s| !exclude.iter().any(|e| e.as_str() == s.subscriber()))
                .cloned()
                .collect();
            (message, targets)
        };

        let mut failed = false;
        for subscription in &targets {
            if self.invoke(subscription, &message).is_err() {
                failed = true;
            }
        }

        self.inner
            .telemetry
            .record(&message.kind, started.elapsed(), failed);
        debug!(
            id = %message.id,
            handlers = targets.len(),
            failed,
            "Dispatched {} to {}",
            message.kind,
            message.channel
        );
        Ok(message.id)
    }

    /// Вызывает один обработчик. `Err` означает синхронный сбой: ошибку,
    /// панику или отсутствие runtime для асинхронного обработчика.
    fn invoke(
        &self,
        subscription: &Arc<Subscription>,
        message: &Arc<Message>,
    ) -> Result<(), HandlerError> {
        // фильтр подписчика тоже пользовательский код
        let accepted = panic::catch_unwind(AssertUnwindSafe(|| subscription.accepts(message)))
            .map_err(|payload| HandlerError::Panicked {
                reason: panic_reason(payload.as_ref()),
            });
        match accepted {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                self.report_failure(subscription, message, e.clone(), false);
                return Err(e);
            }
        }
        if !subscription.try_claim() {
            return Ok(());
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            subscription.handler().call(Arc::clone(message))
        }))
        .unwrap_or_else(|payload| {
            Err(HandlerError::Panicked {
                reason: panic_reason(payload.as_ref()),
            })
        });

        let outcome = match outcome {
            Ok(Invocation::Done) => Ok(()),
            Ok(Invocation::Pending(future)) => match Handle::try_current() {
                Ok(handle) => {
                    self.spawn_pending(&handle, subscription, message, future);
                    Ok(())
                }
                Err(_) => Err(HandlerError::NoRuntime),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                if subscription.is_once() {
                    self.unsubscribe(
                        subscription.subscriber(),
                        Some(subscription.channel()),
                        Some(subscription.id()),
                    );
                }
                Ok(())
            }
            Err(e) => {
                subscription.release();
                self.report_failure(subscription, message, e.clone(), false);
                Err(e)
            }
        }
    }

    /// Запускает future обработчика и отдельную задачу, которая ждёт его
    /// завершения и сообщает о сбое.
    fn spawn_pending(
        &self,
        handle: &Handle,
        subscription: &Arc<Subscription>,
        message: &Arc<Message>,
        future: HandlerFuture,
    ) {
        let task = handle.spawn(future);
        let broker = self.downgrade();
        let subscription = Arc::clone(subscription);
        let message = Arc::clone(message);

        handle.spawn(async move {
            let error = match task.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(join) if join.is_panic() => HandlerError::Panicked {
                    reason: panic_reason(join.into_panic().as_ref()),
                },
                // отменена при остановке runtime
                Err(_) => return,
            };
            if let Some(broker) = broker.upgrade() {
                broker.report_failure(&subscription, &message, error, true);
            }
        });
    }

    fn report_failure(
        &self,
        subscription: &Subscription,
        message: &Message,
        error: HandlerError,
        asynchronous: bool,
    ) {
        error!(
            handler = %subscription.id(),
            subscriber = subscription.subscriber(),
            channel = subscription.channel(),
            message_id = %message.id,
            message_type = %message.kind,
            asynchronous,
            "Handler failed: {}",
            error
        );

        let failure = HandlerFailure {
            handler_id: subscription.id(),
            subscriber: Arc::clone(&subscription.subscriber),
            channel: Arc::clone(&subscription.channel),
            message_id: message.id,
            message_type: message.kind.clone(),
            error,
            asynchronous,
            at: Utc::now(),
        };

        // сбой при обработке самого system.error не переиздаётся
        let bridge = self.inner.bridge_errors.load(Ordering::Acquire)
            && message.kind != SystemEvent::Error.as_ref();
        let payload = bridge.then(|| failure_payload(&failure));

        let _ = self.inner.signals.send(BusSignal::Error(failure));

        if let Some(payload) = payload {
            if let Err(e) = self.publish_event(Event::new(SystemEvent::Error, BUS_SOURCE, payload))
            {
                warn!("Failed to bridge handler error: {}", e);
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Подписки
    ////////////////////////////////////////////////////////////////////////////

    /// Подписывает обработчик на канал.
    ///
    /// Для персистентного канала новый обработчик сразу получает до
    /// `replay_limit` последних сообщений из истории: в фоновой задаче,
    /// если есть tokio runtime, иначе прямо в этом вызове.
    pub fn subscribe(
        &self,
        subscriber: &str,
        channel: &str,
        handler: Handler,
        options: SubscribeOptions,
    ) -> BusResult<Unsubscribe> {
        let subscriber: Arc<str> = Arc::from(subscriber);

        let (subscription, replay) = {
            let mut guard = self.inner.state.write();
            let State { channels, handlers } = &mut *guard;
            let ch = channels
                .get_mut(channel)
                .ok_or_else(|| BusError::channel_not_found(channel))?;

            let pattern = Pattern::compile(
                options
                    .pattern
                    .unwrap_or_else(|| PatternSource::from(".*")),
            )?;
            let id = HandlerId(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
            let subscription = Arc::new(Subscription::new(
                id,
                Arc::clone(&subscriber),
                Arc::clone(ch.name()),
                pattern,
                options.filter,
                handler,
                options.once,
                options.priority,
            ));

            handlers.insert(Arc::clone(&subscription));
            ch.add_subscriber(Arc::clone(&subscriber));

            let replay = if ch.is_persistent() {
                ch.history().recent(Some(self.inner.config.replay_limit))
            } else {
                Vec::new()
            };
            (subscription, replay)
        };

        debug!(
            handler = %subscription.id(),
            pattern = subscription.pattern().as_str(),
            once = subscription.is_once(),
            replay = replay.len(),
            "{} subscribed to {}",
            subscriber,
            channel
        );

        let handle = Unsubscribe {
            broker: self.downgrade(),
            subscriber,
            channel: Arc::clone(&subscription.channel),
            handler_id: subscription.id(),
        };
        if !replay.is_empty() {
            self.replay(subscription, replay);
        }
        Ok(handle)
    }

    /// Повторная доставка истории одному обработчику. История и
    /// телеметрия не обновляются.
    fn replay(
        &self,
        subscription: Arc<Subscription>,
        messages: Vec<Arc<Message>>,
    ) {
        match Handle::try_current() {
            Ok(handle) => {
                let broker = self.clone();
                handle.spawn(async move {
                    for message in &messages {
                        let _ = broker.invoke(&subscription, message);
                    }
                });
            }
            Err(_) => {
                for message in &messages {
                    let _ = self.invoke(&subscription, message);
                }
            }
        }
    }

    /// Подписка на высокоуровневые события. Для каждого типа обработчик
    /// регистрируется в канале, выбранном маршрутизатором, с точным
    /// паттерном и получает только payload.
    ///
    /// `once` действует для каждого типа отдельно. При ошибке уже
    /// созданные подписки снимаются.
    pub fn subscribe_to_event<I, T>(
        &self,
        subscriber: &str,
        event_types: I,
        handler: EventHandler,
        options: EventSubscribeOptions,
    ) -> BusResult<EventSubscription>
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        let mut handles = Vec::new();

        for event_type in event_types {
            let event_type: EventType = event_type.into();
            let kind = event_type.as_str();
            let subscribe_options = SubscribeOptions {
                pattern: Some(PatternSource::from(format!("^{}$", regex::escape(kind)))),
                filter: options.filter.clone(),
                once: options.once,
                ..Default::default()
            };

            match self.subscribe(
                subscriber,
                event_type.channel().name(),
                handler.for_event(kind),
                subscribe_options,
            ) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        handle.unsubscribe();
                    }
                    return Err(e);
                }
            }
        }

        Ok(EventSubscription { handles })
    }

    /// Снимает подписки владельца: одну (`handler_id`), все в канале
    /// (`channel`) или все вообще. `true`, если что-то было снято.
    pub fn unsubscribe(
        &self,
        subscriber: &str,
        channel: Option<&str>,
        handler_id: Option<HandlerId>,
    ) -> bool {
        let removed = {
            let mut guard = self.inner.state.write();
            let State { channels, handlers } = &mut *guard;
            let removed = handlers.remove_matching(subscriber, channel, handler_id);
            for subscription in &removed {
                if !handlers.has_subscriber_in(subscriber, subscription.channel()) {
                    if let Some(ch) = channels.get_mut(subscription.channel()) {
                        ch.remove_subscriber(subscriber);
                    }
                }
            }
            removed.len()
        };

        if removed > 0 {
            debug!(
                handlers = removed,
                channel = channel.unwrap_or("*"),
                "{} unsubscribed",
                subscriber
            );
        }
        removed > 0
    }

    /// Идентификаторы всех подписок владельца.
    pub fn subscriber_handlers(
        &self,
        subscriber: &str,
    ) -> Vec<HandlerId> {
        self.inner.state.read().handlers.handler_ids(subscriber)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.state.read().handlers.len()
    }

    ////////////////////////////////////////////////////////////////////////////
    // История
    ////////////////////////////////////////////////////////////////////////////

    /// Последние `limit` сообщений канала от старых к новым. Для
    /// неизвестного канала пустой список.
    pub fn get_message_history(
        &self,
        channel: &str,
        limit: Option<usize>,
    ) -> Vec<Arc<Message>> {
        self.inner
            .state
            .read()
            .channels
            .get(channel)
            .map(|c| c.history().recent(limit))
            .unwrap_or_default()
    }

    /// Очищает историю, не трогая канал. `false`, если канала нет.
    pub fn clear_history(
        &self,
        channel: &str,
    ) -> bool {
        match self.inner.state.write().channels.get_mut(channel) {
            Some(ch) => {
                ch.history_mut().clear();
                true
            }
            None => false,
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Наблюдаемость
    ////////////////////////////////////////////////////////////////////////////

    pub fn get_performance_metrics(&self) -> BTreeMap<String, TypeMetrics> {
        self.inner.telemetry.metrics()
    }

    pub fn total_messages(&self) -> u64 {
        self.inner.telemetry.totals().0
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let (channel_count, active_subscriptions) = {
            let state = self.inner.state.read();
            (state.channels.len(), state.handlers.len())
        };
        let (total_messages, total_errors) = self.inner.telemetry.totals();
        let (is_healthy, error_rate) = HealthStatus::evaluate(
            total_messages,
            total_errors,
            self.inner.config.health_error_threshold,
        );

        HealthStatus {
            is_healthy,
            channel_count,
            active_subscriptions,
            total_messages,
            total_errors,
            error_rate,
            uptime_secs: self.inner.telemetry.uptime().as_secs(),
        }
    }

    /// Поток служебных сигналов: жизненный цикл и сбои обработчиков.
    pub fn signals(&self) -> broadcast::Receiver<BusSignal> {
        self.inner.signals.subscribe()
    }

    fn signal_info(
        &self,
        text: impl Into<String>,
    ) {
        let _ = self.inner.signals.send(BusSignal::Info(text.into()));
    }
}

/// Создаёт канал или перенастраивает существующий. `true`, если канал уже был.
fn register_channel(
    state: &mut State,
    name: &str,
    options: ChannelOptions,
) -> bool {
    if let Some(channel) = state.channels.get_mut(name) {
        channel.reconfigure(options);
        return true;
    }
    let key = intern_channel(name);
    state
        .channels
        .insert(Arc::clone(&key), Channel::new(key, options));
    false
}

fn failure_payload(failure: &HandlerFailure) -> Value {
    json!({
        "handler_id": failure.handler_id.to_string(),
        "subscriber": &*failure.subscriber,
        "channel": &*failure.channel,
        "message_id": failure.message_id,
        "message_type": failure.message_type,
        "error": failure.error.to_string(),
        "asynchronous": failure.asynchronous,
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
