use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Команда '{command}' завершилась с ошибкой ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Не удалось разобрать '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("Опрос уже выполняется, повторное планирование запрещено")]
    PollInFlight,

    #[error("Индикатор остановлен")]
    Stopped,

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl IndicatorError {
    pub fn parse<T>(input: impl Into<String>, reason: impl ToString) -> Result<T> {
        Err(IndicatorError::Parse {
            input: input.into(),
            reason: reason.to_string(),
        })
    }
}

pub type Result<T> = std::result::Result<T, IndicatorError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! indicator_error {
    (internal, $($arg:tt)*) => {
        $crate::error::IndicatorError::Internal(format!($($arg)*))
    };
    (config, $($arg:tt)*) => {
        $crate::error::IndicatorError::Config(anyhow::anyhow!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helper_builds_error() {
        let result: Result<i64> = IndicatorError::parse("abc", "invalid digit");
        match result {
            Err(IndicatorError::Parse { input, reason }) => {
                assert_eq!(input, "abc");
                assert_eq!(reason, "invalid digit");
            }
            other => panic!("ожидалась ошибка разбора, получено {:?}", other),
        }
    }

    #[test]
    fn test_internal_macro() {
        let err = indicator_error!(internal, "сбой #{}", 3);
        assert_eq!(err.to_string(), "Внутренняя ошибка: сбой #3");
    }
}
