use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// Агрегированные метрики по одному типу сообщений.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TypeMetrics {
    pub count: u64,
    /// Среднее время синхронной доставки, мс.
    pub average_time_ms: f64,
    pub errors: u64,
}

/// Сводка здоровья шины.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub channel_count: usize,
    pub active_subscriptions: usize,
    pub total_messages: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
struct Counter {
    count: AtomicU64,
    total_nanos: AtomicU64,
    errors: AtomicU64,
}

/// Счётчики доставки по типам сообщений.
///
/// Учитывается только синхронная часть: время от входа в `publish` до
/// возврата и ошибки, пойманные синхронно.
#[derive(Debug)]
pub(crate) struct Telemetry {
    by_type: DashMap<String, Counter>,
    started_at: Mutex<Instant>,
}

impl Telemetry {
    pub(crate) fn new() -> Self {
        Self {
            by_type: DashMap::new(),
            started_at: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn record(
        &self,
        kind: &str,
        elapsed: Duration,
        failed: bool,
    ) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let apply = |c: &Counter| {
            c.count.fetch_add(1, Ordering::Relaxed);
            c.total_nanos.fetch_add(nanos, Ordering::Relaxed);
            if failed {
                c.errors.fetch_add(1, Ordering::Relaxed);
            }
        };

        // быстрый путь без аллокации ключа
        if let Some(counter) = self.by_type.get(kind) {
            apply(&counter);
            return;
        }
        apply(&self.by_type.entry(kind.to_owned()).or_default());
    }

    pub(crate) fn metrics(&self) -> BTreeMap<String, TypeMetrics> {
        self.by_type
            .iter()
            .map(|entry| {
                let c = entry.value();
                let count = c.count.load(Ordering::Relaxed);
                let total = c.total_nanos.load(Ordering::Relaxed);
                let average_time_ms = if count == 0 {
                    0.0
                } else {
                    total as f64 / count as f64 / 1_000_000.0
                };
                (
                    entry.key().clone(),
                    TypeMetrics {
                        count,
                        average_time_ms,
                        errors: c.errors.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// `(сообщений, ошибок)` по всем типам.
    pub(crate) fn totals(&self) -> (u64, u64) {
        self.by_type.iter().fold((0, 0), |(m, e), entry| {
            (
                m + entry.count.load(Ordering::Relaxed),
                e + entry.errors.load(Ordering::Relaxed),
            )
        })
    }

    pub(crate) fn uptime(&self) -> Duration {
        self.started_at.lock().elapsed()
    }

    pub(crate) fn reset(&self) {
        self.by_type.clear();
        *self.started_at.lock() = Instant::now();
    }
}

impl HealthStatus {
    /// Шина здорова, пока доля ошибок строго меньше порога. Без трафика
    /// всегда здорова.
    pub(crate) fn evaluate(
        total_messages: u64,
        total_errors: u64,
        threshold: f64,
    ) -> (bool, f64) {
        if total_messages == 0 {
            return (true, 0.0);
        }
        let rate = total_errors as f64 / total_messages as f64;
        (rate < threshold, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_average() {
        let t = Telemetry::new();
        t.record("a", Duration::from_millis(2), false);
        t.record("a", Duration::from_millis(4), true);
        t.record("b", Duration::from_millis(1), false);

        let m = t.metrics();
        assert_eq!(m["a"].count, 2);
        assert_eq!(m["a"].errors, 1);
        assert!((m["a"].average_time_ms - 3.0).abs() < 1e-9);
        assert_eq!(m["b"].count, 1);
        assert_eq!(t.totals(), (3, 1));
    }

    /// Тест проверяет, что после reset метрики пусты.
    #[test]
    fn test_reset_clears() {
        let t = Telemetry::new();
        t.record("a", Duration::from_micros(10), true);
        t.reset();
        assert!(t.metrics().is_empty());
        assert_eq!(t.totals(), (0, 0));
    }

    #[test]
    fn test_health_threshold() {
        assert_eq!(HealthStatus::evaluate(0, 0, 0.1), (true, 0.0));
        // 1 из 20, то есть 5%
        assert!(HealthStatus::evaluate(20, 1, 0.1).0);
        // ровно на пороге уже нездорова
        assert!(!HealthStatus::evaluate(10, 1, 0.1).0);
        assert!(!HealthStatus::evaluate(10, 5, 0.1).0);
    }
}
