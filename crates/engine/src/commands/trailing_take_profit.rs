//! Trailing take-profit: waits for price to reach a trigger, then trails.
//!
//! Phase one watches the most favourable of bid/ask/last until it crosses
//! the trigger price. Phase two places a stop and runs the trailing-stop
//! ratchet, locking in profit as the move extends.

use async_trait::async_trait;
use exchange_api::StopOrderRequest;
use model::{OffsetSpec, Side, Trigger};
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;
use crate::registry::AlgoEntry;

use super::trailing_stop::{trail_offset, TrailState};

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "sell"),
    ArgSpec::new("offset", "1%"),
    ArgSpec::new("triggerOffset", "1%"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("position", ""),
    ArgSpec::new("trigger", "last"),
    ArgSpec::new("background", "true"),
    ArgSpec::new("tag", ""),
];

enum Phase {
    WaitTrigger,
    Trailing(TrailState),
}

/// `trailingTakeProfit(side, offset, triggerOffset, amount, position,
/// trigger, background, tag)`
pub struct TrailingTakeProfit {
    args: NormalizedArgs,
    trigger_price: Decimal,
    phase: Phase,
}

impl Default for TrailingTakeProfit {
    fn default() -> Self {
        Self {
            args: NormalizedArgs::default(),
            trigger_price: Decimal::ZERO,
            phase: Phase::WaitTrigger,
        }
    }
}

#[async_trait]
impl Command for TrailingTakeProfit {
    fn name(&self) -> &'static str {
        "trailingTakeProfit"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        let side = self.args.side()?;

        let raw = self.args.get("triggerOffset").unwrap_or("1%").to_string();
        let trigger_offset: OffsetSpec = raw
            .parse()
            .map_err(|e| EngineError::invalid(format!("{e}")))?;
        // The trigger sits in the favourable direction: above for sells,
        // below for buys.
        self.trigger_price = cx
            .exchange
            .offset_to_price(&cx.symbol, side, &trigger_offset)
            .await?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let side = self.args.side()?;
        info!(
            symbol = %cx.symbol,
            side = %side,
            trigger_price = %self.trigger_price,
            "trailing take-profit armed"
        );
        cx.exchange
            .registry()
            .register(AlgoEntry::new(cx.id, side, cx.session, self.args.tag()));
        Ok(CommandState::KeepGoingBackOff)
    }

    async fn background_execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        match &mut self.phase {
            Phase::WaitTrigger => {
                let side = self.args.side()?;
                let ticker = cx.exchange.ticker(&cx.symbol).await?;
                let price = ticker.extreme(side);
                let crossed = match side {
                    Side::Sell => price >= self.trigger_price,
                    Side::Buy => price <= self.trigger_price,
                };
                if !crossed {
                    return Ok(CommandState::KeepGoingBackOff);
                }
                debug!(price = %price, trigger = %self.trigger_price, "take-profit triggered");

                let offset =
                    self.args.offset.ok_or_else(|| EngineError::invalid("missing offset"))?;
                let stop_price = cx
                    .exchange
                    .offset_to_price(&cx.symbol, side.opposite(), &offset)
                    .await?;
                let tag = self.args.tag().to_string();

                let req = StopOrderRequest {
                    symbol: cx.symbol.clone(),
                    side,
                    amount: self.args.amount()?,
                    price: stop_price,
                    trigger: self.args.trigger.unwrap_or(Trigger::Last),
                };
                let order = cx.exchange.place_stop(&req, cx.session, &tag).await?;
                info!(
                    symbol = %cx.symbol,
                    side = %side,
                    price = %stop_price,
                    order_id = %order.id,
                    "take-profit stop placed, trailing"
                );

                let reference = ticker.side_price(side.opposite());
                self.phase = Phase::Trailing(TrailState {
                    order,
                    last_price: stop_price,
                    offset: trail_offset(offset, reference, stop_price),
                    side,
                    tag,
                });
                Ok(CommandState::KeepGoing)
            }
            Phase::Trailing(trail) => trail.ratchet(cx).await,
        }
    }

    fn completes_in_background(&self) -> bool {
        self.args.background
    }

    async fn on_cancelled(&mut self, cx: &CommandContext) {
        if let Phase::Trailing(trail) = &self.phase {
            trail.cancel(cx).await;
        }
    }
}
