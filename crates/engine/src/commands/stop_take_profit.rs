//! Paired take-profit limit and stop-loss bracket.
//!
//! Places a post-only reduce-only limit at the take-profit price and a
//! stop-market at the stop-loss price, then polls in the foreground at the
//! maximum delay until one leg completes and cancels the other (best
//! effort).

use async_trait::async_trait;
use exchange_api::{LimitOrderRequest, StopOrderRequest};
use model::{OffsetSpec, OrderRef, Trigger};
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;
use crate::registry::AlgoEntry;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "sell"),
    ArgSpec::new("tp", "1%"),
    ArgSpec::new("sl", "1%"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("trigger", "last"),
    ArgSpec::new("tag", ""),
];

/// `stopAndTakeProfitOrder(side, tp, sl, amount, trigger, tag)`
#[derive(Default)]
pub struct StopAndTakeProfitOrder {
    args: NormalizedArgs,
    amount: Decimal,
    tp_price: Decimal,
    sl_price: Decimal,
}

impl StopAndTakeProfitOrder {
    fn offset_arg(&self, name: &str) -> Result<OffsetSpec, EngineError> {
        let raw = self
            .args
            .get_non_empty(name)
            .ok_or_else(|| EngineError::invalid(format!("missing {name}")))?;
        raw.parse().map_err(|e| EngineError::invalid(format!("{e}")))
    }

    /// True when the order is gone from the book (filled or closed).
    async fn leg_done(&self, cx: &CommandContext, order: &OrderRef) -> Result<bool, EngineError> {
        match cx.exchange.api().order(&order.id).await? {
            None => Ok(true),
            Some(snapshot) => Ok(snapshot.is_filled || !snapshot.is_open),
        }
    }

    /// Watch both legs until one completes, then cancel the other.
    ///
    /// The bracket does not chase anything, so the loop runs flat at the
    /// maximum polling delay instead of ramping up from the minimum.
    async fn watch_legs(
        &self,
        cx: &CommandContext,
        tp: &OrderRef,
        sl: &OrderRef,
    ) -> Result<(), EngineError> {
        let wait = cx.exchange.max_poll();
        loop {
            tokio::time::sleep(wait).await;

            if cx.exchange.registry().is_cancelled(cx.id) {
                info!(symbol = %cx.symbol, "bracket cancelled");
                cx.exchange.cancel_quietly(&[tp.clone(), sl.clone()]).await;
                return Ok(());
            }
            if self.leg_done(cx, tp).await? {
                debug!(order_id = %tp.id, "take-profit leg done, cancelling stop");
                cx.exchange.cancel_quietly(std::slice::from_ref(sl)).await;
                return Ok(());
            }
            if self.leg_done(cx, sl).await? {
                debug!(order_id = %sl.id, "stop leg done, cancelling take-profit");
                cx.exchange.cancel_quietly(std::slice::from_ref(tp)).await;
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl Command for StopAndTakeProfitOrder {
    fn name(&self) -> &'static str {
        "stopAndTakeProfitOrder"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        let side = self.args.side()?;

        self.amount = self.args.decimal("amount")?.unwrap_or(Decimal::ZERO);
        if self.amount == Decimal::ZERO {
            return Err(EngineError::zero_size("bracket order has no amount"));
        }

        // Take-profit in the favourable direction, stop-loss on the adverse
        // side of the book.
        let tp = self.offset_arg("tp")?;
        let sl = self.offset_arg("sl")?;
        self.tp_price = cx.exchange.offset_to_price(&cx.symbol, side, &tp).await?;
        self.sl_price = cx
            .exchange
            .offset_to_price(&cx.symbol, side.opposite(), &sl)
            .await?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let side = self.args.side()?;
        let tag = self.args.tag();

        let tp_req = LimitOrderRequest {
            symbol: cx.symbol.clone(),
            side,
            amount: self.amount,
            price: self.tp_price,
            post_only: true,
            reduce_only: true,
        };
        let tp_order = cx.exchange.place_limit(&tp_req, cx.session, tag).await?;

        let sl_req = StopOrderRequest {
            symbol: cx.symbol.clone(),
            side,
            amount: self.amount,
            price: self.sl_price,
            trigger: self.args.trigger.unwrap_or(Trigger::Last),
        };
        let sl_order = match cx.exchange.place_stop(&sl_req, cx.session, tag).await {
            Ok(order) => order,
            Err(e) => {
                // Do not leave a one-legged bracket behind.
                cx.exchange.cancel_quietly(std::slice::from_ref(&tp_order)).await;
                return Err(e.into());
            }
        };

        info!(
            symbol = %cx.symbol,
            side = %side,
            tp = %self.tp_price,
            sl = %self.sl_price,
            amount = %self.amount,
            "bracket placed"
        );
        cx.exchange
            .registry()
            .register(AlgoEntry::new(cx.id, side, cx.session, tag));

        self.watch_legs(cx, &tp_order, &sl_order).await?;
        Ok(CommandState::Finished)
    }
}
