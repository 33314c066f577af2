pub mod bus;
pub mod handler;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use bus::*;
pub use handler::*;
