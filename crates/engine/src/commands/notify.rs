//! Operator notification command.

use async_trait::async_trait;
use parser::ArgItem;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

const DEFAULTS: &[ArgSpec] = &[ArgSpec::new("msg", "")];

/// `notify(msg)`
#[derive(Default)]
pub struct Notify {
    args: NormalizedArgs,
}

#[async_trait]
impl Command for Notify {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let msg = self.args.get("msg").unwrap_or("");
        cx.exchange.notifier().send(msg).await;
        Ok(CommandState::Finished)
    }
}
