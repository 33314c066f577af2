use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового sink-а; пока handle жив, неблокирующий
/// writer продолжает сбрасывать буфер на диск.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    flush_count: AtomicU64,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_count: AtomicU64::new(0),
        }
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Отмечает запрос на flush. Сам сброс делает фоновый writer.
    pub fn flush(&self) {
        let n = self.flush_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(flush_count = n, "Logging flush requested");
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    /// Завершает логирование: drop guard-а дожидается записи буфера.
    pub fn shutdown(mut self) {
        tracing::info!(
            file_sink = self.has_file_sink(),
            flushes = self.flush_count(),
            "Logging shutdown"
        );
        let start = Instant::now();
        drop(self.file_guard.take());
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Logging shutdown completed"
        );
    }
}
