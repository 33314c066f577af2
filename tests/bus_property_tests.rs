use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use flowbus::{Broker, BusConfig, ChannelOptions, Handler, PublishOptions, SubscribeOptions};
use proptest::prelude::*;
use regex::Regex;
use serde_json::json;

fn broker() -> Broker {
    Broker::with_config(BusConfig::default().without_error_bridge())
}

proptest! {
    /// История хранит ровно последние `min(N, k)` сообщений в порядке
    /// публикации.
    #[test]
    fn prop_history_keeps_last_n(capacity in 1usize..50, published in 0usize..150) {
        let broker = broker();
        broker.create_channel("log", ChannelOptions::persistent("log", capacity));

        for n in 0..published {
            broker.publish("log", "entry", json!(n), PublishOptions::default()).unwrap();
        }

        let history = broker.get_message_history("log", None);
        prop_assert_eq!(history.len(), published.min(capacity));

        let expected: Vec<_> = (published.saturating_sub(capacity)..published)
            .map(|n| json!(n))
            .collect();
        let actual: Vec<_> = history.iter().map(|m| m.payload.clone()).collect();
        prop_assert_eq!(actual, expected);
    }
}

proptest! {
    /// `limit` отдаёт хвост истории не длиннее запрошенного.
    #[test]
    fn prop_history_limit(published in 0usize..60, limit in 0usize..80) {
        let broker = broker();
        broker.create_channel("log", ChannelOptions::persistent("log", 40));
        for n in 0..published {
            broker.publish("log", "entry", json!(n), PublishOptions::default()).unwrap();
        }

        let full = broker.get_message_history("log", None);
        let tail = broker.get_message_history("log", Some(limit));
        prop_assert_eq!(tail.len(), full.len().min(limit));
        let ids = |ms: &[Arc<flowbus::Message>]| ms.iter().map(|m| m.id).collect::<Vec<_>>();
        prop_assert_eq!(ids(&full[full.len() - tail.len()..]), ids(&tail));
    }
}

proptest! {
    /// Обработчик с паттерном вызывается ровно для тех типов, которые
    /// совпадают с регулярным выражением.
    #[test]
    fn prop_pattern_matches_like_regex(
        prefix in "[a-c]{1,2}",
        kinds in prop::collection::vec("[a-c]{1,3}\\.[a-z]{1,4}", 0..40),
    ) {
        let broker = broker();
        broker.create_channel("events", ChannelOptions::ephemeral("events", 10));

        let pattern = format!("^{prefix}\\.");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        broker.subscribe(
            "matcher",
            "events",
            Handler::new(move |m| {
                s.lock().unwrap().push(m.kind.clone());
                Ok(())
            }),
            SubscribeOptions::default().pattern(pattern.as_str()),
        ).unwrap();

        for kind in &kinds {
            broker.publish("events", kind.clone(), json!(null), PublishOptions::default()).unwrap();
        }

        let re = Regex::new(&pattern).unwrap();
        let expected: Vec<String> = kinds.iter().filter(|k| re.is_match(k)).cloned().collect();
        prop_assert_eq!(seen.lock().unwrap().clone(), expected);
    }
}

proptest! {
    /// `once`-обработчик срабатывает не больше одного раза при любом числе
    /// публикаций.
    #[test]
    fn prop_once_fires_at_most_once(published in 0usize..30) {
        let broker = broker();
        broker.create_channel("jobs", ChannelOptions::ephemeral("jobs", 10));

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        broker.subscribe(
            "worker",
            "jobs",
            Handler::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            SubscribeOptions::default().once(),
        ).unwrap();

        for _ in 0..published {
            broker.publish("jobs", "job", json!({}), PublishOptions::default()).unwrap();
        }

        prop_assert_eq!(hits.load(Ordering::SeqCst), published.min(1));
        prop_assert_eq!(broker.active_subscriptions(), usize::from(published == 0));
    }
}

proptest! {
    /// Каждый обработчик видит только сообщения своего канала.
    #[test]
    fn prop_channels_are_isolated(targets in prop::collection::vec(0usize..3, 0..60)) {
        let broker = broker();
        let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

        for (i, counter) in counters.iter().enumerate() {
            let name = format!("ch-{i}");
            broker.create_channel(&name, ChannelOptions::ephemeral(name.as_str(), 5));
            let c = counter.clone();
            broker.subscribe(
                "listener",
                &name,
                Handler::new(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
                SubscribeOptions::default(),
            ).unwrap();
        }

        for t in &targets {
            broker.publish(&format!("ch-{t}"), "ping", json!(null), PublishOptions::default()).unwrap();
        }

        for (i, counter) in counters.iter().enumerate() {
            let expected = targets.iter().filter(|&&t| t == i).count();
            prop_assert_eq!(counter.load(Ordering::SeqCst), expected);
        }
        prop_assert_eq!(broker.total_messages(), targets.len() as u64);
    }
}
