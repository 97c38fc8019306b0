//! The command interface driven by the scheduler.

use async_trait::async_trait;
use parser::ArgItem;
use uuid::Uuid;

use crate::error::EngineError;
use crate::exchange::SharedExchange;

/// What a command reports back to the scheduler after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Done; the scheduler advances and removes any registry entry.
    Finished,
    /// Progress was made; repoll at the minimum delay.
    KeepGoing,
    /// Nothing changed; let the polling delay keep growing.
    KeepGoingBackOff,
}

/// Everything a command needs to run: the exchange handle, its symbol, the
/// owning session and its own id (which doubles as the algo-registry key).
#[derive(Clone)]
pub struct CommandContext {
    pub exchange: SharedExchange,
    pub symbol: String,
    pub session: Uuid,
    pub id: Uuid,
}

impl CommandContext {
    pub fn new(exchange: SharedExchange, symbol: impl Into<String>, session: Uuid) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            session,
            id: Uuid::new_v4(),
        }
    }
}

/// One executable action of a command sequence.
///
/// The scheduler calls `setup` with the parsed arguments, then `execute`.
/// A non-Finished result sends the command into the polling loop, which
/// calls `background_execute` until it reports Finished or the algo
/// registry marks the command cancelled (then `on_cancelled` runs instead).
#[async_trait]
pub trait Command: Send {
    /// Action name as it appears in messages.
    fn name(&self) -> &'static str;

    /// Normalize arguments and prepare local state.
    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError>;

    /// Run the foreground step.
    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError>;

    /// Run one polling iteration. Only called after a non-Finished
    /// `execute`.
    async fn background_execute(
        &mut self,
        _cx: &CommandContext,
    ) -> Result<CommandState, EngineError> {
        Ok(CommandState::Finished)
    }

    /// Whether the polling loop may be parked as a background task while
    /// the sequence advances.
    fn completes_in_background(&self) -> bool {
        false
    }

    /// Cancellation hook; typically cancels broker-side orders.
    async fn on_cancelled(&mut self, _cx: &CommandContext) {}
}
