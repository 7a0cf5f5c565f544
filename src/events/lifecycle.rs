use std::fmt;

/// Хуки жизненного цикла, которые вызывает хост
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    /// Хост перезапускает или переконфигурирует виджет
    Teardown,
}

/// Состояние экземпляра индикатора
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorState {
    Uninitialized,
    /// Таблица раскладок загружена, начальная метка показана
    Initialized,
    /// Опрос в процессе
    Subscribed,
    /// Терминальное состояние: нужен новый экземпляр
    Stopped,
}

impl IndicatorState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, IndicatorState::Stopped)
    }
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorState::Uninitialized => "uninitialized",
            IndicatorState::Initialized => "initialized",
            IndicatorState::Subscribed => "subscribed",
            IndicatorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
