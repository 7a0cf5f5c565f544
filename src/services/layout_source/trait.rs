use crate::config::Config;
use crate::error::Result;
use crate::services::layout_table::LayoutTable;
use std::sync::Arc;

/// Trait for sources of keyboard layout information (real tools or emulation)
#[async_trait::async_trait]
pub trait LayoutSourceTrait: Send + Sync {
    /// Enumerate configured layouts, index order preserved
    async fn list_layouts(&self) -> Result<LayoutTable>;

    /// Index of the currently active layout
    async fn current_index(&self) -> Result<i64>;

    /// Shell command line of the long-running change notifier
    fn subscribe_command(&self) -> String;
}

/// Factory function to create an appropriate layout source based on the dry_run flag
pub fn create_layout_source(
    config: Arc<Config>,
    dry_run: bool,
) -> Result<Box<dyn LayoutSourceTrait>> {
    if dry_run {
        Ok(Box::new(super::dry_run::DryRunLayoutSource::new()))
    } else {
        Ok(Box::new(super::xkblayout_state::XkbLayoutStateSource::new(
            config,
        )))
    }
}
