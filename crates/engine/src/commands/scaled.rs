//! Scaled order: a ladder of limit orders between two offsets.

use async_trait::async_trait;
use exchange_api::LimitOrderRequest;
use model::{Easing, OffsetSpec};
use parser::ArgItem;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "buy"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("from", "10"),
    ArgSpec::new("to", "50"),
    ArgSpec::new("count", "10"),
    ArgSpec::new("easing", "linear"),
    ArgSpec::new("tag", ""),
];

/// `scaledOrder(side, amount, from, to, count, easing, tag)`
///
/// Places `count` limit orders with prices interpolated between the
/// `from` and `to` offsets through the easing curve. Placement stops at the
/// first API failure; orders already placed stay.
#[derive(Default)]
pub struct ScaledOrder {
    args: NormalizedArgs,
    from: Option<OffsetSpec>,
    to: Option<OffsetSpec>,
    count: u32,
    easing: Easing,
}

impl ScaledOrder {
    fn offset_arg(args: &NormalizedArgs, name: &str) -> Result<OffsetSpec, EngineError> {
        let raw = args
            .get_non_empty(name)
            .ok_or_else(|| EngineError::invalid(format!("missing {name}")))?;
        raw.parse().map_err(|e| EngineError::invalid(format!("{e}")))
    }
}

#[async_trait]
impl Command for ScaledOrder {
    fn name(&self) -> &'static str {
        "scaledOrder"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;
        self.from = Some(Self::offset_arg(&self.args, "from")?);
        self.to = Some(Self::offset_arg(&self.args, "to")?);

        let raw_count = self.args.get("count").unwrap_or("10");
        self.count = raw_count
            .trim()
            .parse()
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| EngineError::invalid(format!("invalid count '{raw_count}'")))?;

        let raw_easing = self.args.get("easing").unwrap_or("linear");
        self.easing = raw_easing
            .parse()
            .map_err(|e| EngineError::invalid(format!("{e}")))?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let side = self.args.side()?;
        let info = cx
            .exchange
            .symbol_info(&cx.symbol)
            .ok_or_else(|| EngineError::invalid(format!("symbol '{}' was never added", cx.symbol)))?;

        let total = self.args.decimal("amount")?.unwrap_or(Decimal::ZERO);
        if total == Decimal::ZERO {
            return Err(EngineError::zero_size("scaled order has no amount"));
        }

        let from = self.from.ok_or_else(|| EngineError::invalid("missing from"))?;
        let to = self.to.ok_or_else(|| EngineError::invalid("missing to"))?;
        let from_price = cx.exchange.offset_to_price(&cx.symbol, side, &from).await?;
        let to_price = cx.exchange.offset_to_price(&cx.symbol, side, &to).await?;

        // Shrink the ladder when splitting would drop below the venue minimum.
        let mut count = self.count;
        let mut per_order = info.round_amount(total / Decimal::from(count));
        if per_order < info.min_order_size {
            count = (total / info.min_order_size).floor().to_u32().unwrap_or(0);
            if count == 0 {
                return Err(EngineError::zero_size(format!(
                    "amount {total} cannot cover one order of minimum size {}",
                    info.min_order_size
                )));
            }
            per_order = info.round_amount(total / Decimal::from(count));
        }

        let span = to_price - from_price;
        for i in 0..count {
            let t = if count == 1 { 0.0 } else { f64::from(i) / f64::from(count - 1) };
            let eased = Decimal::from_f64_retain(self.easing.apply(t)).unwrap_or(Decimal::ZERO);
            let price = info.round_price(from_price + span * eased);

            let req = LimitOrderRequest {
                symbol: cx.symbol.clone(),
                side,
                amount: per_order,
                price,
                post_only: false,
                reduce_only: false,
            };
            cx.exchange.place_limit(&req, cx.session, self.args.tag()).await?;
        }

        info!(
            symbol = %cx.symbol,
            side = %side,
            orders = count,
            per_order = %per_order,
            from = %from_price,
            to = %to_price,
            "scaled ladder placed"
        );
        Ok(CommandState::Finished)
    }
}
