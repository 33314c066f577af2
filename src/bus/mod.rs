//! Внутрипроцессная шина publish/subscribe.
//!
//! - `broker`: каналы, публикация, подписки, история и телеметрия.
//! - `channel`: конфигурация каналов и таблица встроенных каналов.
//! - `event`: типизированные события и их маршрутизация.
//! - `handler`: обработчики, паттерны и реестр подписок.
//! - `history`: ограниченная история канала.
//! - `intern` (приватный): пул имён каналов.
//! - `message`: сообщение и параметры публикации.
//! - `router`: выбор канала и приоритета по типу события.
//! - `session`: обёртка брокера для одного подписчика.
//! - `signal`: служебные сигналы шины.
//! - `telemetry`: счётчики доставки и здоровье.

pub mod broker;
pub mod channel;
pub mod event;
pub mod handler;
pub mod history;
mod intern;
pub mod message;
pub mod router;
pub mod session;
pub mod signal;
pub mod telemetry;

// Публичный экспорт типов из вложенных модулей, чтобы упростить доступ
// к ним из внешнего кода.
pub use broker::*;
pub use channel::*;
pub use event::*;
pub use handler::*;
pub use history::*;
pub use message::*;
pub use session::*;
pub use signal::*;
pub use telemetry::*;
