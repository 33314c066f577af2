use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Пул `Arc<str>` для имён каналов. Каждое сообщение хранит имя своего
/// канала, поэтому при публикации не аллоцируем строку заново.
///
/// Идентификаторы подписчиков сюда не попадают: пул живёт до конца
/// процесса и не чистится.
static CHANNEL_INTERN: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned `Arc<str>` для имени канала.
#[inline]
pub(crate) fn intern_channel<S: AsRef<str>>(name: S) -> Arc<str> {
    let key = name.as_ref();
    if let Some(existing) = CHANNEL_INTERN.get(key) {
        return existing.clone();
    }
    CHANNEL_INTERN
        .entry(key.to_string())
        .or_insert_with(|| Arc::from(key))
        .clone()
}

#[cfg(test)]
pub(crate) fn is_interned(name: &str) -> bool {
    CHANNEL_INTERN.contains_key(name)
}
