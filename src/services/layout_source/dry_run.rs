use crate::error::Result;
use crate::services::layout_table::LayoutTable;
use tracing::info;

use super::r#trait::LayoutSourceTrait;

const FAKE_LAYOUTS: [&str; 2] = ["us", "ru"];

/// Эмуляция переключения раскладок каждые 5 секунд
const FAKE_SUBSCRIBER: &str = "while true; do sleep 5; echo 1; sleep 5; echo 0; done";

pub struct DryRunLayoutSource;

impl DryRunLayoutSource {
    pub fn new() -> Self {
        info!("Dry-run режим - LayoutSource работает в режиме эмуляции");
        Self
    }
}

#[async_trait::async_trait]
impl LayoutSourceTrait for DryRunLayoutSource {
    async fn list_layouts(&self) -> Result<LayoutTable> {
        Ok(LayoutTable::new(
            FAKE_LAYOUTS.iter().map(|s| s.to_string()).collect(),
        ))
    }

    async fn current_index(&self) -> Result<i64> {
        Ok(0)
    }

    fn subscribe_command(&self) -> String {
        FAKE_SUBSCRIBER.to_string()
    }
}
