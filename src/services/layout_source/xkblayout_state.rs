use crate::config::Config;
use crate::error::Result;
use crate::services::layout_table::{parse_state, LayoutTable};
use crate::utils::run_shell;
use std::sync::Arc;
use tracing::debug;

use super::r#trait::LayoutSourceTrait;

/// Источник на базе xkblayout-state / xkblayout-subscribe
pub struct XkbLayoutStateSource {
    config: Arc<Config>,
}

impl XkbLayoutStateSource {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn state_command(&self, format: &str) -> String {
        format!("{} print {}", self.config.layout.state_bin, format)
    }
}

#[async_trait::async_trait]
impl LayoutSourceTrait for XkbLayoutStateSource {
    async fn list_layouts(&self) -> Result<LayoutTable> {
        let output = run_shell(&self.state_command("%S")).await?;
        let table = LayoutTable::parse(&output);
        debug!("xkblayout-state вернул {} раскладок", table.len());
        Ok(table)
    }

    async fn current_index(&self) -> Result<i64> {
        let output = run_shell(&self.state_command("%c")).await?;
        let index = parse_state(&output)?;
        debug!("xkblayout-state: текущий индекс {}", index);
        Ok(index)
    }

    fn subscribe_command(&self) -> String {
        self.config.layout.subscribe_bin.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndicatorError;

    fn source_with_state_bin(state_bin: &str) -> XkbLayoutStateSource {
        let mut config = Config::default();
        config.layout.state_bin = state_bin.to_string();
        XkbLayoutStateSource::new(Arc::new(config))
    }

    #[tokio::test]
    async fn test_list_layouts_from_fake_tool() {
        // `sh -c "<bin> print %S"`: подставляем функцию-заглушку вместо утилиты
        let source = source_with_state_bin("fake() { printf 'us\\nru\\n'; }; fake");
        let table = source.list_layouts().await.unwrap();
        assert_eq!(table, LayoutTable::new(vec!["us".to_string(), "ru".to_string()]));
    }

    #[tokio::test]
    async fn test_current_index_from_fake_tool() {
        let source = source_with_state_bin("fake() { echo 1; }; fake");
        assert_eq!(source.current_index().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_current_index_malformed_output() {
        let source = source_with_state_bin("fake() { echo garbage; }; fake");
        assert!(matches!(
            source.current_index().await,
            Err(IndicatorError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_tool_is_command_error() {
        let source = source_with_state_bin("/nonexistent/xkblayout-state");
        assert!(matches!(
            source.list_layouts().await,
            Err(IndicatorError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_subscribe_command_uses_config() {
        let source = source_with_state_bin("xkblayout-state");
        assert_eq!(source.subscribe_command(), "xkblayout-subscribe");
    }
}
