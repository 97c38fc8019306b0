//! Aggressive entry: take liquidity by chasing the top of the book with
//! post-only limit orders until the requested size is filled.
//!
//! The loop runs in the foreground with its own pacing. It exits early on
//! cancellation, on an elapsed time limit, or when the price runs away by
//! more than the slippage limit from where the chase started.

use std::time::Duration;

use async_trait::async_trait;
use exchange_api::{ApiError, LimitOrderRequest};
use model::{OrderRef, Side};
use parser::ArgItem;
use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::args::{normalize, ArgSpec, NormalizedArgs};
use crate::command::{Command, CommandContext, CommandState};
use crate::error::EngineError;
use crate::registry::AlgoEntry;

const DEFAULTS: &[ArgSpec] = &[
    ArgSpec::new("side", "buy"),
    ArgSpec::new("amount", "0"),
    ArgSpec::new("position", ""),
    ArgSpec::new("timeLimit", ""),
    ArgSpec::new("slippageLimit", ""),
    ArgSpec::new("tag", ""),
];

/// How often a freshly placed order is re-submitted when the venue does not
/// acknowledge it.
const PLACEMENT_ATTEMPTS: u32 = 20;

struct ActiveOrder {
    order: OrderRef,
    price: Decimal,
}

/// `aggressiveEntry(side, amount, position, timeLimit, slippageLimit, tag)`
#[derive(Default)]
pub struct AggressiveEntry {
    args: NormalizedArgs,
    amount: Decimal,
    time_limit: Option<Duration>,
    slippage_limit: Option<Decimal>,
}

#[async_trait]
impl Command for AggressiveEntry {
    fn name(&self) -> &'static str {
        "aggressiveEntry"
    }

    async fn setup(&mut self, cx: &CommandContext, args: &[ArgItem]) -> Result<(), EngineError> {
        self.args = normalize(&cx.exchange, &cx.symbol, DEFAULTS, args).await?;

        self.amount = match self.args.amount {
            Some(a) => a,
            None => self.args.decimal("amount")?.unwrap_or(Decimal::ZERO),
        };
        if self.amount == Decimal::ZERO {
            return Err(EngineError::zero_size("aggressive entry has no amount"));
        }

        self.time_limit = match self.args.get_non_empty("timeLimit") {
            Some(raw) => Some(
                model::parse_duration(raw).map_err(|e| EngineError::invalid(format!("{e}")))?,
            ),
            None => None,
        };
        self.slippage_limit = self.args.decimal("slippageLimit")?;
        Ok(())
    }

    async fn execute(&mut self, cx: &CommandContext) -> Result<CommandState, EngineError> {
        let side = self.args.side()?;
        cx.exchange
            .registry()
            .register(AlgoEntry::new(cx.id, side, cx.session, self.args.tag()));

        let mut active = None;
        let result = self.chase(cx, side, &mut active).await;
        if let Some(leftover) = active {
            cx.exchange.cancel_quietly(std::slice::from_ref(&leftover.order)).await;
        }
        result?;
        Ok(CommandState::Finished)
    }
}

impl AggressiveEntry {
    /// The chase loop. `active` is held by the caller so the in-flight
    /// order can be cancelled on any exit path, including errors.
    async fn chase(
        &self,
        cx: &CommandContext,
        side: Side,
        active: &mut Option<ActiveOrder>,
    ) -> Result<(), EngineError> {
        let exchange = &cx.exchange;
        let info = exchange
            .symbol_info(&cx.symbol)
            .ok_or_else(|| EngineError::invalid(format!("symbol '{}' was never added", cx.symbol)))?;
        let min = exchange.min_poll();
        let max = exchange.max_poll();

        let mut amount_left = self.amount;
        let mut wait = min + Duration::from_secs(2);
        let deadline = self.time_limit.map(|limit| Instant::now() + limit);
        let mut slippage_price: Option<Decimal> = None;

        loop {
            if amount_left < info.min_order_size {
                info!(symbol = %cx.symbol, "aggressive entry complete");
                return Ok(());
            }
            if exchange.registry().is_cancelled(cx.id) {
                info!(symbol = %cx.symbol, "aggressive entry cancelled");
                return Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!(symbol = %cx.symbol, left = %amount_left, "aggressive entry time limit hit");
                return Ok(());
            }

            let ticker = exchange.ticker(&cx.symbol).await?;
            let price = ticker.side_price(side);

            if let Some(limit) = self.slippage_limit {
                let start = *slippage_price.get_or_insert(price);
                let runaway = match side {
                    Side::Buy => price > start + limit,
                    Side::Sell => price < start - limit,
                };
                if runaway {
                    warn!(
                        symbol = %cx.symbol,
                        price = %price,
                        start = %start,
                        limit = %limit,
                        "aggressive entry slippage limit hit"
                    );
                    return Ok(());
                }
            }

            match active.as_ref() {
                None => {
                    let amount = info.round_amount(amount_left);
                    let order = self.place_registered(cx, side, amount, price).await?;
                    debug!(price = %price, amount = %amount, order_id = %order.id, "chasing");
                    *active = Some(ActiveOrder { order, price });
                }
                Some(current) => {
                    let Some(snapshot) = exchange.api().order(&current.order.id).await? else {
                        warn!(order_id = %current.order.id, "active order vanished, aborting");
                        *active = None;
                        return Ok(());
                    };
                    if snapshot.is_filled {
                        amount_left -= snapshot.executed;
                        debug!(executed = %snapshot.executed, left = %amount_left, "order filled");
                        *active = None;
                        wait = min;
                    } else if !snapshot.is_open {
                        warn!(order_id = %snapshot.id, "order closed unfilled, aborting");
                        *active = None;
                        return Ok(());
                    } else if price != current.price {
                        exchange.cancel_quietly(std::slice::from_ref(&current.order)).await;
                        amount_left -= snapshot.executed;
                        debug!(
                            old_price = %current.price,
                            new_price = %price,
                            executed = %snapshot.executed,
                            "top of book moved, repricing"
                        );
                        *active = None;
                        wait = min;
                    }
                }
            }

            tokio::time::sleep(wait).await;
            wait = (wait + Duration::from_secs(1)).min(max);
        }
    }

    /// Place a post-only order at the top of the book, retrying placement
    /// while the venue fails to acknowledge it.
    async fn place_registered(
        &self,
        cx: &CommandContext,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderRef, EngineError> {
        let req = LimitOrderRequest {
            symbol: cx.symbol.clone(),
            side,
            amount,
            price,
            post_only: true,
            reduce_only: false,
        };
        for attempt in 1..=PLACEMENT_ATTEMPTS {
            let order = cx.exchange.place_limit(&req, cx.session, self.args.tag()).await?;
            if cx.exchange.api().order(&order.id).await?.is_some() {
                return Ok(order);
            }
            debug!(attempt, "order did not register, retrying");
        }
        Err(EngineError::Api(ApiError::Transport(format!(
            "order failed to register after {PLACEMENT_ATTEMPTS} attempts"
        ))))
    }
}
