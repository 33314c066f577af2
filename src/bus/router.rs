//! Маршрутизация высокоуровневых событий по каналам и приоритетам.
//!
//! Решение принимается только по строке типа, поэтому пользовательские
//! типы (`EventType::Custom`) маршрутизируются так же, как встроенные.

use super::{BuiltinChannel, Priority};

/// Канал для типа события: по префиксу домена, иначе `global`.
pub fn route_channel(event_type: &str) -> BuiltinChannel {
    const PREFIXES: [(&str, BuiltinChannel); 7] = [
        ("comment.", BuiltinChannel::Comments),
        ("user.", BuiltinChannel::Users),
        ("ai.", BuiltinChannel::Ai),
        ("collaboration.", BuiltinChannel::Collaboration),
        ("export.", BuiltinChannel::Export),
        ("notification.", BuiltinChannel::Notifications),
        ("system.", BuiltinChannel::Errors),
    ];

    PREFIXES
        .iter()
        .find(|(prefix, _)| event_type.starts_with(prefix))
        .map_or(BuiltinChannel::Global, |(_, channel)| *channel)
}

/// Приоритет для типа события. Правила проверяются сверху вниз.
pub fn route_priority(event_type: &str) -> Priority {
    if event_type.contains("error") {
        Priority::Urgent
    } else if event_type.contains("warning") || event_type.starts_with("system.") {
        Priority::High
    } else if event_type.starts_with("notification.") {
        Priority::Medium
    } else if event_type.starts_with("collaboration.") {
        Priority::Low
    } else {
        Priority::Medium
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("comment.created", BuiltinChannel::Comments)]
    #[case("comment.reaction_added", BuiltinChannel::Comments)]
    #[case("user.typing", BuiltinChannel::Users)]
    #[case("ai.analysis_failed", BuiltinChannel::Ai)]
    #[case("collaboration.cursor_update", BuiltinChannel::Collaboration)]
    #[case("export.progress", BuiltinChannel::Export)]
    #[case("notification.read", BuiltinChannel::Notifications)]
    #[case("system.error", BuiltinChannel::Errors)]
    #[case("system.health_check", BuiltinChannel::Errors)]
    #[case("integration.connected", BuiltinChannel::Global)]
    #[case("order.shipped", BuiltinChannel::Global)]
    #[case("comments", BuiltinChannel::Global)]
    fn test_route_channel(
        #[case] event_type: &str,
        #[case] expected: BuiltinChannel,
    ) {
        assert_eq!(route_channel(event_type), expected);
    }

    /// Тест проверяет порядок правил: `error` сильнее префикса домена.
    #[rstest]
    #[case("system.error", Priority::Urgent)]
    #[case("ai.analysis_error", Priority::Urgent)]
    #[case("system.warning", Priority::High)]
    #[case("system.info", Priority::High)]
    #[case("export.warning_issued", Priority::High)]
    #[case("notification.created", Priority::Medium)]
    #[case("collaboration.cursor_update", Priority::Low)]
    #[case("comment.created", Priority::Medium)]
    #[case("custom.thing", Priority::Medium)]
    fn test_route_priority(
        #[case] event_type: &str,
        #[case] expected: Priority,
    ) {
        assert_eq!(route_priority(event_type), expected);
    }
}
