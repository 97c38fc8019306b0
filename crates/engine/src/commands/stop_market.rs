//! Stop-market order placement.
//!
//! The stop price sits on the adverse side of the book: a sell stop below
//! the bid, a buy stop above the ask. That is the opposite direction of a
//! plain limit offset, so the price is resolved against the opposite side.

use async_trait::async_trait;
use exchange_api::StopOrderRequest;
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::info;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "sell"),
    ArgSpec::new("offset", "0"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("trigger", "last"),
    ArgSpec::new("tag", ""),
];

/// `stopMarketOrder(side, offset, amount, trigger, tag)`
#[derive(Default)]
pub struct StopMarketOrder {
    args: NormalizedArgs,
    stop_price: Decimal,
}

#[async_trait]
impl Command for StopMarketOrder {
    fn name(&self) -> &'static str {
        "stopMarketOrder"
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
        let req = StopOrderRequest {
            symbol: cx.symbol.clone(),
            side: self.args.side()?,
            amount: self.args.amount()?,
            price: self.stop_price,
            trigger: self.args.trigger.unwrap_or_default(),
        };
        let order = cx.exchange.place_stop(&req, cx.session, self.args.tag()).await?;
        info!(
            symbol = %req.symbol,
            side = %req.side,
            amount = %req.amount,
            price = %req.price,
            trigger = %req.trigger,
            order_id = %order.id,
            "stop order placed"
        );
        Ok(CommandState::Finished)
    }
}
