use std::{collections::VecDeque, sync::Arc};

use super::Message;

/// Ограниченная история сообщений канала.
///
/// При переполнении вытесняются самые старые записи (FIFO), так что
/// в буфере всегда остаются последние `capacity` сообщений в порядке
/// публикации.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<Arc<Message>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(
        &mut self,
        message: Arc<Message>,
    ) {
        self.entries.push_back(message);
        self.trim();
    }

    /// Последние `limit` сообщений, от старых к новым. `None` означает всю историю.
    pub fn recent(
        &self,
        limit: Option<usize>,
    ) -> Vec<Arc<Message>> {
        let take = limit.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries
            .iter()
            .skip(self.entries.len() - take)
            .cloned()
            .collect()
    }

    /// Меняет ёмкость; лишние старые записи отбрасываются сразу.
    pub fn set_capacity(
        &mut self,
        capacity: usize,
    ) {
        self.capacity = capacity;
        self.trim();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bus::PublishOptions;

    fn msg(n: u64) -> Arc<Message> {
        Arc::new(Message::new(
            Arc::from("history"),
            format!("order.{n}"),
            json!(n),
            PublishOptions::default(),
        ))
    }

    fn kinds(items: &[Arc<Message>]) -> Vec<String> {
        items.iter().map(|m| m.kind.clone()).collect()
    }

    /// Тест проверяет, что после 7 публикаций при ёмкости 5 остаются
    /// сообщения 3..=7 в порядке публикации.
    #[test]
    fn test_overflow_keeps_latest() {
        let mut history = HistoryBuffer::new(5);
        for n in 1..=7 {
            history.push(msg(n));
        }
        assert_eq!(history.len(), 5);
        assert_eq!(
            kinds(&history.recent(None)),
            vec!["order.3", "order.4", "order.5", "order.6", "order.7"]
        );
    }

    #[test]
    fn test_recent_with_limit() {
        let mut history = HistoryBuffer::new(10);
        for n in 1..=4 {
            history.push(msg(n));
        }
        assert_eq!(kinds(&history.recent(Some(2))), vec!["order.3", "order.4"]);
        // лимит больше длины: возвращается всё
        assert_eq!(history.recent(Some(100)).len(), 4);
        assert!(history.recent(Some(0)).is_empty());
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut history = HistoryBuffer::new(0);
        history.push(msg(1));
        assert!(history.is_empty());
    }

    /// Тест проверяет, что уменьшение ёмкости сразу обрезает старые записи.
    #[test]
    fn test_shrink_capacity() {
        let mut history = HistoryBuffer::new(5);
        for n in 1..=5 {
            history.push(msg(n));
        }
        history.set_capacity(2);
        assert_eq!(history.capacity(), 2);
        assert_eq!(kinds(&history.recent(None)), vec!["order.4", "order.5"]);
    }

    #[test]
    fn test_clear() {
        let mut history = HistoryBuffer::new(3);
        history.push(msg(1));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 3);
    }
}
