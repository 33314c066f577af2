use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, SettingsResult};

/// Настройки поведения брокера.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Доля ошибок, начиная с которой шина считается нездоровой.
    pub health_error_threshold: f64,
    /// Сколько последних сообщений из истории получает новый подписчик.
    pub replay_limit: usize,
    /// Ёмкость broadcast-канала служебных сигналов.
    pub signal_capacity: usize,
    /// Публиковать ли сбои обработчиков как `system.error`.
    pub bridge_errors: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            health_error_threshold: 0.10,
            replay_limit: 10,
            signal_capacity: 256,
            bridge_errors: true,
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> SettingsResult<()> {
        if !(self.health_error_threshold > 0.0 && self.health_error_threshold <= 1.0) {
            return Err(SettingsError::invalid(
                "bus.health_error_threshold",
                format!("expected (0, 1], got {}", self.health_error_threshold),
            ));
        }
        if self.signal_capacity == 0 {
            return Err(SettingsError::invalid(
                "bus.signal_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn with_health_threshold(
        mut self,
        threshold: f64,
    ) -> Self {
        self.health_error_threshold = threshold;
        self
    }

    pub fn with_replay_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.replay_limit = limit;
        self
    }

    /// Отключает публикацию сбоев обработчиков в канал `errors`.
    pub fn without_error_bridge(mut self) -> Self {
        self.bridge_errors = false;
        self
    }
}
