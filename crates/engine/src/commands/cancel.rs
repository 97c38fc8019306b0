//! Cancel running algo orders by scope.

use async_trait::async_trait;
use parser::ArgItem;
use tracing::info;
use uuid::Uuid;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;
use crate::registry::CancelScope;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("which", "session"),
    ArgSpec::new("tag", ""),
    ArgSpec::new("id", ""),
];

/// `cancelOrders(which, tag, id)`
///
/// `which` is one of `all` (every algo order on the exchange), `session`
/// (this sequence's algo orders), `tagged` (this sequence's orders carrying
/// `tag`) or `id` (one order by uuid).
#[derive(Default)]
pub struct CancelOrders {
    args: NormalizedArgs,
}

#[async_trait]
impl Command for CancelOrders {
    fn name(&self) -> &'static str {
        "cancelOrders"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        // Validate the scope up front so bad input fails before execution.
        self.scope(cx)?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let scope = self.scope(cx)?;
        let marked = cx.exchange.registry().cancel(&scope);
        info!(scope = ?scope, marked, "algo orders cancelled");
        Ok(CommandState::Finished)
    }
}

impl CancelOrders {
    fn scope(&self, cx: &CommandContext) -> Result<CancelScope, EngineError> {
        let which = self.args.get("which").unwrap_or("session").trim().to_lowercase();
        match which.as_str() {
            "all" => Ok(CancelScope::All),
            "session" => Ok(CancelScope::Session(cx.session)),
            "tagged" => Ok(CancelScope::Tag {
                session: cx.session,
                tag: self.args.tag().to_string(),
            }),
            "id" => {
                let raw = self
                    .args
                    .get_non_empty("id")
                    .ok_or_else(|| EngineError::invalid("cancelOrders(id) needs an id"))?;
                let id: Uuid = raw
                    .parse()
                    .map_err(|_| EngineError::invalid(format!("invalid order id '{raw}'")))?;
                Ok(CancelScope::Id(id))
            }
            other => Err(EngineError::invalid(format!("unknown cancel scope '{other}'"))),
        }
    }
}
