use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub layout: LayoutConfig,
    pub poll: PollConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Путь к xkblayout-state, если бинарник не в PATH
    pub state_bin: String,
    /// Путь к xkblayout-subscribe, если бинарник не в PATH
    pub subscribe_bin: String,
    /// Отображение имени раскладки в метку, например {"ru phonetic" = "ru"}
    pub display_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    pub update_interval_ms: Option<u64>,
    pub on_failure: String,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub reap_timeout_ms: u64,
    /// Пауза перед перезапуском подписчика, закрывшего поток
    pub respawn_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: String,
    pub path: Option<PathBuf>,
    pub placeholder: String,
}

/// Что делать, если опрос подписчика завершился ошибкой
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Залогировать и прекратить подписку
    Stop,
    /// Повторить с экспоненциальной задержкой
    Retry,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            state_bin: "xkblayout-state".to_string(),
            subscribe_bin: "xkblayout-subscribe".to_string(),
            display_map: HashMap::new(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: None,
            on_failure: "stop".to_string(),
            retry_backoff_ms: 500,
            max_backoff_ms: 30_000,
            reap_timeout_ms: 1_000,
            respawn_delay_ms: 1_000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: "stdout".to_string(),
            path: None,
            placeholder: "□".to_string(),
        }
    }
}

impl PollConfig {
    /// Пауза между применённым обновлением и следующим опросом (None - сразу)
    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self.on_failure.as_str() {
            "retry" => FailurePolicy::Retry,
            _ => FailurePolicy::Stop,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    pub fn respawn_delay(&self) -> Option<Duration> {
        Some(self.respawn_delay_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("XKBI_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "pretty" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация внешних утилит
        if self.layout.state_bin.trim().is_empty() {
            anyhow::bail!("layout.state_bin не может быть пустым");
        }
        if self.layout.subscribe_bin.trim().is_empty() {
            anyhow::bail!("layout.subscribe_bin не может быть пустым");
        }

        // Валидация настроек опроса
        match self.poll.on_failure.as_str() {
            "stop" | "retry" => {}
            _ => anyhow::bail!("Неверная политика ошибок опроса: {}", self.poll.on_failure),
        }

        if self.poll.retry_backoff_ms == 0 {
            anyhow::bail!("retry_backoff_ms должно быть больше 0");
        }

        if self.poll.retry_backoff_ms > self.poll.max_backoff_ms {
            anyhow::bail!(
                "retry_backoff_ms ({}) не может превышать max_backoff_ms ({})",
                self.poll.retry_backoff_ms,
                self.poll.max_backoff_ms
            );
        }

        // Валидация вывода
        match self.display.mode.as_str() {
            "stdout" => {}
            "file" => {
                if self.display.path.is_none() {
                    anyhow::bail!("display.mode = \"file\" требует display.path");
                }
            }
            _ => anyhow::bail!("Неверный режим вывода: {}", self.display.mode),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll.failure_policy(), FailurePolicy::Stop);
        assert_eq!(config.poll.update_interval(), None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.poll.on_failure = "ignore".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.display.mode = "file".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poll.retry_backoff_ms = 60_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.layout.subscribe_bin = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_update_interval_means_continuous() {
        let mut config = Config::default();
        config.poll.update_interval_ms = Some(0);
        assert_eq!(config.poll.update_interval(), None);

        config.poll.update_interval_ms = Some(250);
        assert_eq!(config.poll.update_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_load_from_toml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "indicator.toml",
                r#"
                [layout]
                state_bin = "/opt/xkb/xkblayout-state"

                [layout.display_map]
                "ru" = "RU"
                "lt sgs" = "sgs"

                [poll]
                on_failure = "retry"
                "#,
            )?;
            jail.set_env("XKBI_LAYOUT__SUBSCRIBE_BIN", "/opt/xkb/xkblayout-subscribe");

            let config = Config::load("indicator.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.layout.state_bin, "/opt/xkb/xkblayout-state");
            assert_eq!(config.layout.subscribe_bin, "/opt/xkb/xkblayout-subscribe");
            assert_eq!(config.layout.display_map.get("ru").map(String::as_str), Some("RU"));
            assert_eq!(config.poll.failure_policy(), FailurePolicy::Retry);
            assert_eq!(config.display.placeholder, "□");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.layout.state_bin, "xkblayout-state");
            assert_eq!(config.display.mode, "stdout");
            Ok(())
        });
    }
}
