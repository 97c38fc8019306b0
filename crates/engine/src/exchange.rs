//! Runtime handle for one open exchange connection.
//!
//! Owns everything the commands of that exchange share: the API port, the
//! symbol table, polling bounds, the session store, the algo-order registry
//! and the background task set. Commands receive this handle through their
//! context and never touch process-global state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use exchange_api::{
    ApiError, LimitOrderRequest, MarketOrderRequest, SharedExchangeApi, StopOrderRequest,
};
use metrics::SharedMetrics;
use model::{OffsetSpec, OrderRef, Side, SymbolInfo, Ticker};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::EngineError;
use crate::notify::SharedNotifier;
use crate::registry::AlgoRegistry;
use crate::session::SessionStore;

/// Default polling bounds in seconds.
const DEFAULT_MIN_POLL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLL: Duration = Duration::from_secs(30);

/// One open exchange with its engine-side state.
pub struct Exchange {
    name: String,
    api: SharedExchangeApi,
    symbols: RwLock<HashMap<String, SymbolInfo>>,
    min_poll: Duration,
    max_poll: Duration,
    registry: AlgoRegistry,
    sessions: SessionStore,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: SharedMetrics,
    notifier: SharedNotifier,
}

/// Shared handle to an exchange runtime.
pub type SharedExchange = Arc<Exchange>;

impl Exchange {
    pub fn new(api: SharedExchangeApi, metrics: SharedMetrics, notifier: SharedNotifier) -> Self {
        Self {
            name: api.name().to_string(),
            api,
            symbols: RwLock::new(HashMap::new()),
            min_poll: DEFAULT_MIN_POLL,
            max_poll: DEFAULT_MAX_POLL,
            registry: AlgoRegistry::new(),
            sessions: SessionStore::new(),
            tasks: Mutex::new(Vec::new()),
            metrics,
            notifier,
        }
    }

    /// Override the polling bounds (seconds between background iterations).
    pub fn with_polling_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_poll = min;
        self.max_poll = max.max(min);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api(&self) -> &SharedExchangeApi {
        &self.api
    }

    pub fn min_poll(&self) -> Duration {
        self.min_poll
    }

    pub fn max_poll(&self) -> Duration {
        self.max_poll
    }

    pub fn registry(&self) -> &AlgoRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn notifier(&self) -> &SharedNotifier {
        &self.notifier
    }

    // ------------------------------------------------------------------
    // Symbol table
    // ------------------------------------------------------------------

    /// Fetch and cache contract details for a symbol.
    pub async fn add_symbol(&self, symbol: &str) -> Result<(), EngineError> {
        if self.symbols.read().contains_key(symbol) {
            return Ok(());
        }
        let info = self
            .api
            .symbol_info(symbol)
            .await?
            .ok_or_else(|| EngineError::invalid(format!("unknown symbol '{symbol}'")))?;
        self.symbols.write().insert(symbol.to_string(), info);
        Ok(())
    }

    /// Cached contract details, if `add_symbol` has been called.
    pub fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        self.symbols.read().get(symbol).cloned()
    }

    fn require_symbol(&self, symbol: &str) -> Result<SymbolInfo, EngineError> {
        self.symbol_info(symbol)
            .ok_or_else(|| EngineError::invalid(format!("symbol '{symbol}' was never added")))
    }

    // ------------------------------------------------------------------
    // Price and position math
    // ------------------------------------------------------------------

    pub async fn ticker(&self, symbol: &str) -> Result<Ticker, ApiError> {
        self.api.ticker(symbol).await
    }

    /// Resolve an offset against the current ticker.
    ///
    /// Plain and percent offsets move away from the side-quoted price in
    /// the side-favourable direction: below the bid for buys, above the ask
    /// for sells. The result is rounded to the symbol's price precision.
    pub async fn offset_to_price(
        &self,
        symbol: &str,
        side: Side,
        offset: &OffsetSpec,
    ) -> Result<Decimal, EngineError> {
        let info = self.require_symbol(symbol)?;
        let ticker = self.api.ticker(symbol).await?;
        let reference = ticker.side_price(side);
        let hundred = Decimal::ONE_HUNDRED;

        let raw = match (offset, side) {
            (OffsetSpec::Ticks(n), Side::Buy) => reference - n,
            (OffsetSpec::Ticks(n), Side::Sell) => reference + n,
            (OffsetSpec::Percent(p), Side::Buy) => reference * (Decimal::ONE - p / hundred),
            (OffsetSpec::Percent(p), Side::Sell) => reference * (Decimal::ONE + p / hundred),
            (OffsetSpec::Absolute(x), _) => *x,
        };
        if raw <= Decimal::ZERO {
            return Err(EngineError::invalid(format!(
                "offset {offset} resolves to non-positive price {raw}"
            )));
        }
        Ok(info.round_price(raw))
    }

    /// Signed position size for a symbol: the base-asset wallet amount.
    pub async fn position_size(&self, symbol: &str) -> Result<Decimal, EngineError> {
        let info = self.require_symbol(symbol)?;
        let balances = self.api.wallet_balances().await?;
        Ok(balances
            .iter()
            .find(|b| b.currency == info.base)
            .map(|b| b.amount)
            .unwrap_or(Decimal::ZERO))
    }

    /// Resolve a position spec into a concrete side and amount.
    ///
    /// - empty spec: the passed side/amount stand
    /// - `all`: close the current position completely
    /// - a number: trade the delta from the current position to the target
    ///
    /// The returned bool is the "everything" flag for market orders.
    pub async fn position_to_amount(
        &self,
        symbol: &str,
        position: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<(Side, Decimal, bool), EngineError> {
        let position = position.trim();
        if position.is_empty() {
            return Ok((side, amount, false));
        }
        let info = self.require_symbol(symbol)?;
        let current = self.position_size(symbol).await?;

        if position.eq_ignore_ascii_case("all") {
            let side = if current >= Decimal::ZERO { Side::Sell } else { Side::Buy };
            return Ok((side, info.round_amount(current.abs()), true));
        }

        let target: Decimal = position
            .parse()
            .map_err(|_| EngineError::invalid(format!("invalid position '{position}'")))?;
        let delta = target - current;
        let side = if delta >= Decimal::ZERO { Side::Buy } else { Side::Sell };
        Ok((side, info.round_amount(delta.abs()), false))
    }

    /// Clamp a requested size to the available balance and the symbol
    /// minimum. Returns zero when nothing tradable remains.
    pub async fn order_size_from_amount(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        let info = self.require_symbol(symbol)?;
        let balances = self.api.wallet_balances().await?;
        let available = |currency: &str| {
            balances
                .iter()
                .find(|b| b.currency == currency)
                .map(|b| b.available)
                .unwrap_or(Decimal::ZERO)
        };

        let max = match side {
            Side::Buy => {
                if price <= Decimal::ZERO {
                    Decimal::ZERO
                } else {
                    available(&info.quote) / price
                }
            }
            Side::Sell => available(&info.base),
        };

        let clamped = info.round_amount(amount.min(max));
        if clamped < info.min_order_size {
            return Ok(Decimal::ZERO);
        }
        Ok(clamped)
    }

    // ------------------------------------------------------------------
    // Order placement wrappers (metrics + session recording)
    // ------------------------------------------------------------------

    pub async fn place_limit(
        &self,
        req: &LimitOrderRequest,
        session: Uuid,
        tag: &str,
    ) -> Result<OrderRef, ApiError> {
        let order = self.api.limit_order(req).await?;
        self.metrics.inc_orders_placed();
        self.sessions.record(session, tag, order.clone());
        Ok(order)
    }

    pub async fn place_market(
        &self,
        req: &MarketOrderRequest,
        session: Uuid,
        tag: &str,
    ) -> Result<OrderRef, ApiError> {
        let order = self.api.market_order(req).await?;
        self.metrics.inc_orders_placed();
        self.sessions.record(session, tag, order.clone());
        Ok(order)
    }

    pub async fn place_stop(
        &self,
        req: &StopOrderRequest,
        session: Uuid,
        tag: &str,
    ) -> Result<OrderRef, ApiError> {
        let order = self.api.stop_order(req).await?;
        self.metrics.inc_orders_placed();
        self.sessions.record(session, tag, order.clone());
        Ok(order)
    }

    /// Move an order and swap the session-recorded id.
    pub async fn move_order(
        &self,
        order: &OrderRef,
        price: Decimal,
        session: Uuid,
        tag: &str,
    ) -> Result<OrderRef, ApiError> {
        let moved = self.api.update_order_price(order, price).await?;
        self.metrics.inc_price_updates();
        self.sessions.replace(session, tag, &order.id, moved.clone());
        Ok(moved)
    }

    /// Best-effort cancel that only logs failures.
    pub async fn cancel_quietly(&self, orders: &[OrderRef]) {
        if orders.is_empty() {
            return;
        }
        match self.api.cancel_orders(orders).await {
            Ok(()) => self.metrics.inc_orders_cancelled(),
            Err(e) => tracing::warn!(exchange = %self.name, error = %e, "cancel failed"),
        }
    }

    // ------------------------------------------------------------------
    // Background task set
    // ------------------------------------------------------------------

    /// Spawn a background task tracked by this exchange.
    ///
    /// The handle is recorded synchronously, so the task is visible to
    /// `wait_for_background_tasks` before the caller continues.
    pub fn add_task<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(tokio::spawn(future));
    }

    /// Await every tracked background task, including any added while
    /// waiting.
    pub async fn wait_for_background_tasks(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                let _ = handle.await;
            }
        }
    }

    /// Number of currently tracked background tasks.
    pub fn background_task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::create_log_notifier;
    use exchange_api::paper::PaperExchange;
    use metrics::create_metrics;
    use rust_decimal_macros::dec;

    fn btc_info() -> SymbolInfo {
        SymbolInfo {
            symbol: "BTC-PERPETUAL".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            min_order_size: dec!(0.001),
            asset_precision: 3,
            price_precision: 1,
        }
    }

    fn paper_with_symbol() -> Arc<PaperExchange> {
        let paper = Arc::new(PaperExchange::new("deribit"));
        paper.add_symbol(btc_info());
        paper.set_ticker(
            "BTC-PERPETUAL",
            Ticker { bid: dec!(1000), ask: dec!(1001), last: dec!(1000) },
        );
        paper
    }

    async fn exchange(paper: Arc<PaperExchange>) -> Exchange {
        let ex = Exchange::new(paper, create_metrics(), create_log_notifier());
        ex.add_symbol("BTC-PERPETUAL").await.unwrap();
        ex
    }

    #[tokio::test]
    async fn test_add_symbol_unknown_fails() {
        let paper = Arc::new(PaperExchange::new("deribit"));
        let ex = Exchange::new(paper, create_metrics(), create_log_notifier());
        assert!(matches!(
            ex.add_symbol("NOPE").await,
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_offset_ticks() {
        let ex = exchange(paper_with_symbol()).await;
        let buy = ex
            .offset_to_price("BTC-PERPETUAL", Side::Buy, &OffsetSpec::Ticks(dec!(100)))
            .await
            .unwrap();
        assert_eq!(buy, dec!(900)); // bid 1000 - 100

        let sell = ex
            .offset_to_price("BTC-PERPETUAL", Side::Sell, &OffsetSpec::Ticks(dec!(100)))
            .await
            .unwrap();
        assert_eq!(sell, dec!(1101)); // ask 1001 + 100
    }

    #[tokio::test]
    async fn test_offset_percent_and_absolute() {
        let ex = exchange(paper_with_symbol()).await;
        let buy = ex
            .offset_to_price("BTC-PERPETUAL", Side::Buy, &OffsetSpec::Percent(dec!(1)))
            .await
            .unwrap();
        assert_eq!(buy, dec!(990)); // bid 1000 * 0.99

        let abs = ex
            .offset_to_price("BTC-PERPETUAL", Side::Sell, &OffsetSpec::Absolute(dec!(1234.56)))
            .await
            .unwrap();
        assert_eq!(abs, dec!(1234.6)); // rounded to 1 dp
    }

    #[tokio::test]
    async fn test_offset_nonpositive_price_rejected() {
        let ex = exchange(paper_with_symbol()).await;
        let result = ex
            .offset_to_price("BTC-PERPETUAL", Side::Buy, &OffsetSpec::Ticks(dec!(2000)))
            .await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_position_to_amount_target() {
        let paper = paper_with_symbol();
        paper.set_balance("BTC", dec!(10), dec!(10));
        let ex = exchange(paper).await;

        let (side, amount, everything) = ex
            .position_to_amount("BTC-PERPETUAL", "42", Side::Buy, dec!(0))
            .await
            .unwrap();
        assert_eq!(side, Side::Buy);
        assert_eq!(amount, dec!(32));
        assert!(!everything);

        let (side, amount, _) = ex
            .position_to_amount("BTC-PERPETUAL", "4", Side::Buy, dec!(0))
            .await
            .unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(amount, dec!(6));
    }

    #[tokio::test]
    async fn test_position_to_amount_all() {
        let paper = paper_with_symbol();
        paper.set_balance("BTC", dec!(3), dec!(3));
        let ex = exchange(paper).await;

        let (side, amount, everything) = ex
            .position_to_amount("BTC-PERPETUAL", "all", Side::Buy, dec!(1))
            .await
            .unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(amount, dec!(3));
        assert!(everything);
    }

    #[tokio::test]
    async fn test_position_empty_passthrough() {
        let ex = exchange(paper_with_symbol()).await;
        let (side, amount, everything) = ex
            .position_to_amount("BTC-PERPETUAL", "  ", Side::Sell, dec!(7))
            .await
            .unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(amount, dec!(7));
        assert!(!everything);
    }

    #[tokio::test]
    async fn test_order_size_clamped_to_balance() {
        let paper = paper_with_symbol();
        paper.set_balance("USD", dec!(500), dec!(500));
        let ex = exchange(paper).await;

        // Wants 1 BTC at 1000 but only 500 USD available.
        let size = ex
            .order_size_from_amount("BTC-PERPETUAL", Side::Buy, dec!(1000), dec!(1))
            .await
            .unwrap();
        assert_eq!(size, dec!(0.5));
    }

    #[tokio::test]
    async fn test_order_size_below_min_is_zero() {
        let paper = paper_with_symbol();
        paper.set_balance("USD", dec!(0.5), dec!(0.5));
        let ex = exchange(paper).await;

        let size = ex
            .order_size_from_amount("BTC-PERPETUAL", Side::Buy, dec!(1000), dec!(1))
            .await
            .unwrap();
        assert_eq!(size, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_background_tasks_visible_and_awaited() {
        let ex = Arc::new(exchange(paper_with_symbol()).await);
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag2 = flag.clone();

        ex.add_task(async move {
            flag2.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(ex.background_task_count(), 1);

        ex.wait_for_background_tasks().await;
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(ex.background_task_count(), 0);
    }
}
