//! Plain limit order placement.

use async_trait::async_trait;
use exchange_api::LimitOrderRequest;
use parser::ArgItem;
use tracing::info;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "buy"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("offset", "0"),
    ArgSpec::new("postOnly", "false"),
    ArgSpec::new("reduceOnly", "false"),
    ArgSpec::new("tag", ""),
];

/// `limitOrder(side, amount, offset, postOnly, reduceOnly, tag)`
#[derive(Default)]
pub struct LimitOrder {
    args: NormalizedArgs,
}

#[async_trait]
impl Command for LimitOrder {
    fn name(&self) -> &'static str {
        "limitOrder"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let req = LimitOrderRequest {
            symbol: cx.symbol.clone(),
            side: self.args.side()?,
            amount: self.args.amount()?,
            price: self.args.order_price()?,
            post_only: self.args.flag("postOnly"),
            reduce_only: self.args.flag("reduceOnly"),
        };
        let order = cx.exchange.place_limit(&req, cx.session, self.args.tag()).await?;
        info!(
            symbol = %req.symbol,
            side = %req.side,
            amount = %req.amount,
            price = %req.price,
            order_id = %order.id,
            "limit order placed"
        );
        Ok(CommandState::Finished)
    }
}
