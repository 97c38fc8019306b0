//! Trailing stop: a stop-market order ratcheted behind the price.
//!
//! The stop only ever moves in the favourable direction. For a sell
//! (protecting a long) it moves up as the bid rises; for a buy (protecting
//! a short) it moves down as the ask falls. A move is committed only after
//! the broker accepted the new price.

use async_trait::async_trait;
use exchange_api::StopOrderRequest;
use model::{OffsetSpec, OrderRef, Side, Trigger};
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;
use crate::registry::AlgoEntry;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "sell"),
    ArgSpec::new("offset", "1%"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("position", ""),
    ArgSpec::new("trigger", "last"),
    ArgSpec::new("background", "true"),
    ArgSpec::new("tag", ""),
];

/// Live state of a trailing stop order, shared with the trailing
/// take-profit's second phase.
#[derive(Debug)]
pub(crate) struct TrailState {
    pub order: OrderRef,
    pub last_price: Decimal,
    pub offset: OffsetSpec,
    pub side: Side,
    pub tag: String,
}

impl TrailState {
    /// One ratchet iteration.
    ///
    /// Finished when the order filled or left the book; KeepGoing after a
    /// successful move; KeepGoingBackOff when the stop stays put.
    pub(crate) async fn ratchet(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let Some(snapshot) = cx.exchange.api().order(&self.order.id).await? else {
            return Ok(CommandState::Finished);
        };
        if snapshot.is_filled || !snapshot.is_open {
            return Ok(CommandState::Finished);
        }

        let suggested = cx
            .exchange
            .offset_to_price(&cx.symbol, self.side.opposite(), &self.offset)
            .await?;
        let improves = match self.side {
            Side::Sell => suggested > self.last_price,
            Side::Buy => suggested < self.last_price,
        };
        if !improves {
            return Ok(CommandState::KeepGoingBackOff);
        }

        let moved = cx
            .exchange
            .move_order(&self.order, suggested, cx.session, &self.tag)
            .await?;
        debug!(
            old_id = %self.order.id,
            new_id = %moved.id,
            price = %suggested,
            "trailing stop moved"
        );
        self.order = moved;
        self.last_price = suggested;
        Ok(CommandState::KeepGoing)
    }

    pub(crate) async fn cancel(&self, cx: &CommandContext) {
        cx.exchange.cancel_quietly(std::slice::from_ref(&self.order)).await;
    }
}

/// Turn the user's offset into the trailing distance.
///
/// An absolute `@X` offset fixes the initial stop at X, so the trailing
/// distance becomes the gap between the current reference price and X. A
/// percent offset is kept as a percent so the distance widens with price.
pub(crate) fn trail_offset(user: OffsetSpec, reference: Decimal, stop_price: Decimal) -> OffsetSpec {
    match user {
        OffsetSpec::Absolute(_) => OffsetSpec::Ticks((reference - stop_price).abs()),
        other => other,
    }
}

/// `trailingStop(side, offset, amount, position, trigger, background, tag)`
#[derive(Default)]
pub struct TrailingStop {
    args: NormalizedArgs,
    stop_price: Decimal,
    trail: Option<TrailState>,
}

#[async_trait]
impl Command for TrailingStop {
    fn name(&self) -> &'static str {
        "trailingStop"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        let offset = self.args.offset.ok_or_else(|| EngineError::invalid("missing offset"))?;
        self.stop_price = cx
            .exchange
            .offset_to_price(&cx.symbol, self.args.opposite_side()?, &offset)
            .await?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let side = self.args.side()?;
        let tag = self.args.tag().to_string();

        let req = StopOrderRequest {
            symbol: cx.symbol.clone(),
            side,
            amount: self.args.amount()?,
            price: self.stop_price,
            trigger: self.args.trigger.unwrap_or(Trigger::Last),
        };
        let order = cx.exchange.place_stop(&req, cx.session, &tag).await?;
        info!(
            symbol = %req.symbol,
            side = %side,
            price = %self.stop_price,
            order_id = %order.id,
            "trailing stop placed"
        );

        let ticker = cx.exchange.ticker(&cx.symbol).await?;
        let reference = ticker.side_price(side.opposite());
        let offset = self.args.offset.unwrap_or(OffsetSpec::Percent(Decimal::ONE));
        self.trail = Some(TrailState {
            order,
            last_price: self.stop_price,
            offset: trail_offset(offset, reference, self.stop_price),
            side,
            tag,
        });

        cx.exchange
            .registry()
            .register(AlgoEntry::new(cx.id, side, cx.session, self.args.tag()));
        Ok(CommandState::KeepGoingBackOff)
    }

    async fn background_execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        match self.trail.as_mut() {
            Some(trail) => trail.ratchet(cx).await,
            None => Ok(CommandState::Finished),
        }
    }

    fn completes_in_background(&self) -> bool {
        self.args.background
    }

    async fn on_cancelled(&mut self, cx: &CommandContext) {
        if let Some(trail) = &self.trail {
            trail.cancel(cx).await;
        }
    }
}
