use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flowbus::{
    Broker, BusConfig, ChannelOptions, Event, Handler, PublishOptions, SubscribeOptions,
};
use flowbus_error::HandlerError;
use serde_json::json;

fn broker_with_channel(persistent: bool) -> Broker {
    let broker = Broker::with_config(BusConfig::default().without_error_bridge());
    let options = if persistent {
        ChannelOptions::persistent("bench", 1000)
    } else {
        ChannelOptions::ephemeral("bench", 1000)
    };
    broker.create_channel("bench", options);
    broker
}

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    for subscribers in [0usize, 1, 10, 100] {
        let broker = broker_with_channel(false);
        for n in 0..subscribers {
            broker
                .subscribe(
                    &format!("sub-{n}"),
                    "bench",
                    Handler::new(|m| {
                        black_box(&m.payload);
                        Ok(())
                    }),
                    SubscribeOptions::default(),
                )
                .unwrap();
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    broker
                        .publish(
                            "bench",
                            "order.created",
                            black_box(json!({"id": 1})),
                            PublishOptions::default(),
                        )
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

/// Стоимость регулярок: 50 подписчиков, совпадает только один.
fn bench_pattern_matching(c: &mut Criterion) {
    let broker = broker_with_channel(false);
    for n in 0..50 {
        broker
            .subscribe(
                "matcher",
                "bench",
                Handler::new(|_| Ok(())),
                SubscribeOptions::default().pattern(format!(r"^order\.{n}$")),
            )
            .unwrap();
    }

    c.bench_function("publish_50_patterns_1_match", |b| {
        b.iter(|| {
            broker
                .publish("bench", "order.7", json!(null), PublishOptions::default())
                .unwrap()
        })
    });
}

fn bench_history_append(c: &mut Criterion) {
    let broker = broker_with_channel(true);
    c.bench_function("publish_persistent_full_history", |b| {
        b.iter(|| {
            broker
                .publish("bench", "log", black_box(json!(1)), PublishOptions::default())
                .unwrap()
        })
    });
    black_box(broker.get_message_history("bench", Some(10)));
}

fn bench_publish_event_routing(c: &mut Criterion) {
    let broker = Broker::with_config(BusConfig::default().without_error_bridge());
    broker.initialize();
    c.bench_function("publish_event_routed", |b| {
        b.iter(|| {
            broker
                .publish_event(Event::new("comment.created", "bench", json!({"text": "hi"})))
                .unwrap()
        })
    });
}

fn bench_failing_handler(c: &mut Criterion) {
    let broker = broker_with_channel(false);
    broker
        .subscribe(
            "faulty",
            "bench",
            Handler::new(|_| Err(HandlerError::msg("bench"))),
            SubscribeOptions::default(),
        )
        .unwrap();
    c.bench_function("publish_failing_handler", |b| {
        b.iter(|| {
            broker
                .publish("bench", "x", json!(null), PublishOptions::default())
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_pattern_matching,
    bench_history_append,
    bench_publish_event_routing,
    bench_failing_handler
);
criterion_main!(benches);
