//! Command sequence scheduling and the shared polling loop.
//!
//! Foreground commands of a sequence run strictly in order. When a command
//! reports a non-Finished state, the scheduler either drives the polling
//! loop itself or, if the command opted into background completion, parks
//! the loop as a background task and advances to the next action.

use std::time::Duration;

use parser::Action;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalogue;
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;
use crate::exchange::SharedExchange;

/// Run one block's actions against an exchange.
///
/// Creates the session, executes actions in series, then awaits the
/// exchange's background tasks before closing the session. Abort handling
/// follows the propagation policy: invalid arguments abort the block,
/// zero-size and runtime errors abort only their command, and the
/// flow-control abort ends the block silently.
pub async fn run_sequence(exchange: SharedExchange, symbol: &str, actions: &[Action]) {
    let session = Uuid::new_v4();
    exchange.sessions().open(session);
    debug!(exchange = %exchange.name(), symbol = %symbol, %session, "sequence started");

    for action in actions {
        let mut command = catalogue::build(&action.name);
        let cx = CommandContext::new(exchange.clone(), symbol, session);
        exchange.metrics().inc_commands_started();

        match command.setup(&cx, &action.args).await {
            Ok(()) => {}
            Err(EngineError::ZeroSize(reason)) => {
                warn!(command = command.name(), %reason, "nothing to trade, skipping");
                continue;
            }
            Err(EngineError::AbortSequence) => break,
            Err(e) => {
                exchange.metrics().inc_command_errors();
                error!(command = command.name(), error = %e, "argument normalization failed");
                break;
            }
        }

        match command.execute(&cx).await {
            Ok(CommandState::Finished) => {
                exchange.registry().remove(cx.id);
            }
            Ok(state) => maybe_run_to_completion(command, cx, state).await,
            Err(EngineError::AbortSequence) => {
                debug!(command = command.name(), "sequence stopped by flow control");
                break;
            }
            Err(EngineError::ZeroSize(reason)) => {
                warn!(command = command.name(), %reason, "nothing to trade, skipping");
                exchange.registry().remove(cx.id);
            }
            Err(e) => {
                exchange.metrics().inc_command_errors();
                error!(command = command.name(), error = %e, "command failed");
                exchange.registry().remove(cx.id);
            }
        }
    }

    exchange.wait_for_background_tasks().await;
    exchange.sessions().close(session);
    debug!(exchange = %exchange.name(), %session, "sequence finished");
}

/// Decide where a suspended command finishes: in the background task pool
/// when it opted in, otherwise inline before the next action starts.
async fn maybe_run_to_completion(command: Box<dyn Command>, cx: CommandContext, state: CommandState) {
    if command.completes_in_background() {
        let exchange = cx.exchange.clone();
        exchange.add_task(poll_to_completion(command, cx, state));
    } else {
        poll_to_completion(command, cx, state).await;
    }
}

/// The shared polling loop.
///
/// Sleeps between iterations, growing the delay by one second up to the
/// exchange maximum; a KeepGoing result resets it to the minimum.
/// Cancellation is observed on wake, before the next iteration runs.
async fn poll_to_completion(mut command: Box<dyn Command>, cx: CommandContext, initial: CommandState) {
    let min = cx.exchange.min_poll();
    let max = cx.exchange.max_poll();
    let mut wait = min;
    let mut state = initial;

    while state != CommandState::Finished {
        tokio::time::sleep(wait).await;
        if wait < max {
            wait += Duration::from_secs(1);
        }

        if cx.exchange.registry().is_cancelled(cx.id) {
            info!(command = command.name(), id = %cx.id, "command cancelled");
            command.on_cancelled(&cx).await;
            break;
        }

        state = match command.background_execute(&cx).await {
            Ok(s) => s,
            Err(e) => {
                cx.exchange.metrics().inc_command_errors();
                error!(command = command.name(), error = %e, "background step failed");
                break;
            }
        };

        if state == CommandState::KeepGoing {
            wait = min;
        }
    }

    cx.exchange.registry().remove(cx.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::notify::create_log_notifier;
    use crate::registry::{AlgoEntry, CancelScope};
    use async_trait::async_trait;
    use exchange_api::paper::PaperExchange;
    use metrics::create_metrics;
    use model::{Side, SymbolInfo, Ticker};
    use parser::ArgItem;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const SYMBOL: &str = "BTC-PERPETUAL";

    async fn test_exchange() -> SharedExchange {
        let paper = Arc::new(PaperExchange::new("deribit"));
        paper.add_symbol(SymbolInfo {
            symbol: SYMBOL.into(),
            base: "BTC".into(),
            quote: "USD".into(),
            min_order_size: dec!(0.001),
            asset_precision: 3,
            price_precision: 1,
        });
        paper.set_ticker(SYMBOL, Ticker { bid: dec!(1000), ask: dec!(1001), last: dec!(1000) });
        let ex = Arc::new(
            Exchange::new(paper, create_metrics(), create_log_notifier())
                .with_polling_bounds(Duration::from_secs(1), Duration::from_secs(5)),
        );
        ex.add_symbol(SYMBOL).await.unwrap();
        ex
    }

    /// Counts polling iterations, finishing after a fixed number.
    struct CountdownCommand {
        remaining: u32,
        polls: Arc<AtomicU32>,
        background: bool,
    }

    #[async_trait]
    impl Command for CountdownCommand {
        fn name(&self) -> &'static str {
            "countdown"
        }

        async fn setup(&mut self, _cx: &CommandContext, _args: &[ArgItem]) -> Result<(), EngineError> {
            Ok(())
        }

        async fn execute(&mut self, _cx: &CommandContext) -> Result<CommandState, EngineError> {
            Ok(CommandState::KeepGoing)
        }

        async fn background_execute(
            &mut self,
            _cx: &CommandContext,
        ) -> Result<CommandState, EngineError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.remaining -= 1;
            if self.remaining == 0 {
                Ok(CommandState::Finished)
            } else {
                Ok(CommandState::KeepGoingBackOff)
            }
        }

        fn completes_in_background(&self) -> bool {
            self.background
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_runs_to_finished_and_deregisters() {
        let ex = test_exchange().await;
        let polls = Arc::new(AtomicU32::new(0));
        let cx = CommandContext::new(ex.clone(), SYMBOL, Uuid::new_v4());
        let id = cx.id;
        ex.registry().register(AlgoEntry::new(id, Side::Sell, cx.session, ""));

        let command = Box::new(CountdownCommand {
            remaining: 3,
            polls: polls.clone(),
            background: false,
        });
        poll_to_completion(command, cx, CommandState::KeepGoing).await;

        assert_eq!(polls.load(Ordering::SeqCst), 3);
        // Finished commands leave the registry before the scheduler proceeds.
        assert!(ex.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_observes_cancellation() {
        let ex = test_exchange().await;
        let polls = Arc::new(AtomicU32::new(0));
        let cx = CommandContext::new(ex.clone(), SYMBOL, Uuid::new_v4());
        let entry = ex
            .registry()
            .register(AlgoEntry::new(cx.id, Side::Sell, cx.session, ""));

        // Cancel before the loop ever wakes: it must exit without polling.
        ex.registry().cancel(&CancelScope::Id(entry.id));

        let command = Box::new(CountdownCommand {
            remaining: 100,
            polls: polls.clone(),
            background: false,
        });
        poll_to_completion(command, cx, CommandState::KeepGoing).await;

        assert_eq!(polls.load(Ordering::SeqCst), 0);
        assert!(ex.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_command_parks_and_sequence_waits() {
        let ex = test_exchange().await;
        let polls = Arc::new(AtomicU32::new(0));

        let command = Box::new(CountdownCommand {
            remaining: 2,
            polls: polls.clone(),
            background: true,
        });
        let cx = CommandContext::new(ex.clone(), SYMBOL, Uuid::new_v4());
        maybe_run_to_completion(command, cx, CommandState::KeepGoing).await;

        // Parked, not finished yet.
        assert_eq!(ex.background_task_count(), 1);
        ex.wait_for_background_tasks().await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sequence_unknown_command_is_noop() {
        let ex = test_exchange().await;
        let actions = vec![Action { name: "frobnicate".into(), args: vec![] }];
        run_sequence(ex.clone(), SYMBOL, &actions).await;
        // The substituted no-op never fails.
        assert_eq!(ex.metrics().command_errors(), 0);
        assert_eq!(ex.metrics().commands_started(), 1);
    }
}
