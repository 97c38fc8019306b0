//! Market order placement.

use async_trait::async_trait;
use exchange_api::MarketOrderRequest;
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::info;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "buy"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("position", ""),
    ArgSpec::new("tag", ""),
];

/// `marketOrder(side, amount, position, tag)`
#[derive(Default)]
pub struct MarketOrder {
    args: NormalizedArgs,
}

#[async_trait]
impl Command for MarketOrder {
    fn name(&self) -> &'static str {
        "marketOrder"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let amount = match self.args.amount {
            Some(a) => a,
            None => self.args.decimal("amount")?.unwrap_or(Decimal::ZERO),
        };
        if amount == Decimal::ZERO && !self.args.is_everything {
            return Err(EngineError::zero_size("market order has no amount"));
        }

        let req = MarketOrderRequest {
            symbol: cx.symbol.clone(),
            side: self.args.side()?,
            amount,
            is_everything: self.args.is_everything,
        };
        let order = cx.exchange.place_market(&req, cx.session, self.args.tag()).await?;
        info!(
            symbol = %req.symbol,
            side = %req.side,
            amount = %req.amount,
            everything = req.is_everything,
            order_id = %order.id,
            "market order placed"
        );
        Ok(CommandState::Finished)
    }
}
