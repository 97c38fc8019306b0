//! Flow control commands: `wait`, `continueIf` and `stopIf`.
//!
//! The conditional commands evaluate a predicate against live market data
//! and raise the silent sequence abort when the flow should stop. Both
//! abort the same way; the abort is flow control, not a failure.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use model::{parse_duration, Condition, ConditionInputs};
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::debug;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

const WAIT_DEFAULTS: &[ArgSpec] = &[ArgSpec::new("duration", "0")];

/// `wait(duration)`
#[derive(Default)]
pub struct Wait {
    duration: Duration,
}

#[async_trait]
impl Command for Wait {
    fn name(&self) -> &'static str {
        "wait"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        let normalized = normalize(&cx.exchange, &cx.symbol, WAIT_DEFAULTS, args).await?;
        let raw = normalized.get("duration").unwrap_or("0");
        self.duration =
            parse_duration(raw).map_err(|e| EngineError::invalid(format!("{e}")))?;
        Ok(())
    }

    async fn execute(&mut self, _cx: &CommandContext) -> Result<CommandState, EngineError> {
        debug!(seconds = self.duration.as_secs_f64(), "waiting");
        tokio::time::sleep(self.duration).await;
        Ok(CommandState::Finished)
    }
}

const IF_DEFAULTS: &[ArgSpec] = &[ArgSpec::new("if", "always"), ArgSpec::new("value", "")];

async fn parse_condition(
    cx: &CommandContext,
    args: &[ArgItem],
) -> Result<Condition, EngineError> {
    let normalized: NormalizedArgs = normalize(&cx.exchange, &cx.symbol, IF_DEFAULTS, args).await?;
    let name = normalized.get("if").unwrap_or("always");
    let value = normalized.get("value").unwrap_or("");
    Condition::parse(name, value).map_err(|e| EngineError::invalid(format!("{e}")))
}

/// Gather only the live inputs the condition actually tests.
async fn gather_inputs(
    cx: &CommandContext,
    condition: &Condition,
) -> Result<ConditionInputs, EngineError> {
    let mid_price = if condition.needs_price() {
        cx.exchange.ticker(&cx.symbol).await?.mid()
    } else {
        Decimal::ZERO
    };
    let position = if condition.needs_position() {
        cx.exchange.position_size(&cx.symbol).await?
    } else {
        Decimal::ZERO
    };
    Ok(ConditionInputs { mid_price, position, now: Utc::now() })
}

/// `continueIf(if, value)` - aborts the block when the test is false.
#[derive(Default)]
pub struct ContinueIf {
    condition: Option<Condition>,
}

#[async_trait]
impl Command for ContinueIf {
    fn name(&self) -> &'static str {
        "continueIf"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.condition = Some(parse_condition(cx, args).await?);
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let condition = self
            .condition
            .as_ref()
            .ok_or_else(|| EngineError::invalid("missing condition"))?;
        let inputs = gather_inputs(cx, condition).await?;
        if condition.evaluate(&inputs) {
            Ok(CommandState::Finished)
        } else {
            debug!(?condition, "continueIf test failed, stopping sequence");
            Err(EngineError::AbortSequence)
        }
    }
}

/// `stopIf(if, value)` - aborts the block when the test is true.
#[derive(Default)]
pub struct StopIf {
    condition: Option<Condition>,
}

#[async_trait]
impl Command for StopIf {
    fn name(&self) -> &'static str {
        "stopIf"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.condition = Some(parse_condition(cx, args).await?);
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let condition = self
            .condition
            .as_ref()
            .ok_or_else(|| EngineError::invalid("missing condition"))?;
        let inputs = gather_inputs(cx, condition).await?;
        if condition.evaluate(&inputs) {
            debug!(?condition, "stopIf test passed, stopping sequence");
            Err(EngineError::AbortSequence)
        } else {
            Ok(CommandState::Finished)
        }
    }
}
