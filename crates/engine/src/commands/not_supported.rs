//! No-op substituted for unsupported or unknown actions.

use std::time::Duration;

use async_trait::async_trait;
use parser::ArgItem;
use tracing::info;

use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

/// Stand-in that logs, naps for a second and succeeds.
#[derive(Default)]
pub struct NotSupported {
    requested: String,
}

impl NotSupported {
    pub fn new(requested: impl Into<String>) -> Self {
        Self { requested: requested.into() }
    }
}

#[async_trait]
impl Command for NotSupported {
    fn name(&self) -> &'static str {
        "notSupported"
    }

    async fn setup(&mut self, _cx: &CommandContext, _args: &[ArgItem]) -> Result<(), EngineError> {
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        info!(
            exchange = %cx.exchange.name(),
            requested = %self.requested,
            "command not supported here, skipping"
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(CommandState::Finished)
    }
}
