use std::fmt;

/// Почему очередной опрос не принёс новой метки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoUpdateReason {
    /// Подписчик завершился и был перезапущен в этом раунде
    Respawned,
    /// У процесса нет stdout
    NoStream,
    /// Процесс закрыл поток (прочитана пустая строка)
    StreamClosed,
}

/// Результат одного опроса подписчика
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Label(String),
    NoUpdate(NoUpdateReason),
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollOutcome::Label(label) => write!(f, "метка \"{}\"", label),
            PollOutcome::NoUpdate(reason) => write!(f, "без обновления ({:?})", reason),
        }
    }
}
