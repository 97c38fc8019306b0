//! In-memory exchange used for dry runs and tests.
//!
//! The paper exchange answers the full [`ExchangeApi`](crate::ExchangeApi)
//! port from local state: tickers and balances are set by the caller, orders
//! rest in a map until the caller fills or closes them. A ticker script can
//! be queued so consecutive `ticker()` calls walk through a price path,
//! which keeps polling tests deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use model::{OrderRef, OrderSnapshot, Side, SymbolInfo, Ticker, WalletBalance};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{ApiError, ExchangeApi, LimitOrderRequest, MarketOrderRequest, StopOrderRequest};

#[derive(Debug, Clone)]
struct PaperOrder {
    id: String,
    symbol: String,
    side: Side,
    amount: Decimal,
    remaining: Decimal,
    executed: Decimal,
    is_open: bool,
    is_filled: bool,
    price: Option<Decimal>,
}

impl PaperOrder {
    fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id.clone(),
            side: self.side,
            amount: self.amount,
            remaining: self.remaining,
            executed: self.executed,
            is_filled: self.is_filled,
            is_open: self.is_open,
            price: self.price,
        }
    }
}

/// Simulated exchange backing the daemon's dry-run mode and the test suite.
pub struct PaperExchange {
    name: String,
    auto_symbols: bool,
    default_ticker: Option<Ticker>,
    symbols: DashMap<String, SymbolInfo>,
    current_ticker: DashMap<String, Ticker>,
    ticker_script: Mutex<VecDeque<Ticker>>,
    balances: Mutex<Vec<WalletBalance>>,
    orders: DashMap<String, PaperOrder>,
    fail_init: AtomicBool,

    limit_order_calls: AtomicU64,
    market_order_calls: AtomicU64,
    stop_order_calls: AtomicU64,
    cancel_calls: AtomicU64,
    price_update_calls: AtomicU64,
    terminate_calls: AtomicU64,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auto_symbols: false,
            default_ticker: None,
            symbols: DashMap::new(),
            current_ticker: DashMap::new(),
            ticker_script: Mutex::new(VecDeque::new()),
            balances: Mutex::new(Vec::new()),
            orders: DashMap::new(),
            fail_init: AtomicBool::new(false),
            limit_order_calls: AtomicU64::new(0),
            market_order_calls: AtomicU64::new(0),
            stop_order_calls: AtomicU64::new(0),
            cancel_calls: AtomicU64::new(0),
            price_update_calls: AtomicU64::new(0),
            terminate_calls: AtomicU64::new(0),
        }
    }

    /// Synthesize contract details for symbols nobody registered.
    ///
    /// The daemon's dry-run mode turns this on so arbitrary webhook symbols
    /// work out of the box; tests leave it off.
    pub fn with_auto_symbols(mut self) -> Self {
        self.auto_symbols = true;
        self
    }

    /// Quote this ticker for symbols nobody set a price for.
    ///
    /// Dry runs use it so offset arithmetic has something to work against.
    pub fn with_default_ticker(mut self, ticker: Ticker) -> Self {
        self.default_ticker = Some(ticker);
        self
    }

    /// Register contract details for a symbol.
    pub fn add_symbol(&self, info: SymbolInfo) {
        self.symbols.insert(info.symbol.clone(), info);
    }

    /// Set the current ticker for a symbol.
    pub fn set_ticker(&self, symbol: &str, ticker: Ticker) {
        self.current_ticker.insert(symbol.to_string(), ticker);
    }

    /// Queue tickers to be returned by consecutive `ticker()` calls.
    ///
    /// Each call pops one entry and makes it current; when the queue is
    /// empty the last current ticker sticks.
    pub fn push_tickers<I: IntoIterator<Item = Ticker>>(&self, tickers: I) {
        self.ticker_script.lock().extend(tickers);
    }

    /// Set a wallet balance, replacing any previous entry for the currency.
    pub fn set_balance(&self, currency: &str, amount: Decimal, available: Decimal) {
        let mut balances = self.balances.lock();
        balances.retain(|b| b.currency != currency);
        balances.push(WalletBalance {
            wallet: "exchange".to_string(),
            currency: currency.to_string(),
            amount,
            available,
        });
    }

    /// Execute part of a resting order.
    pub fn fill_order(&self, id: &str, qty: Decimal) {
        if let Some(mut order) = self.orders.get_mut(id) {
            let qty = qty.min(order.remaining);
            order.executed += qty;
            order.remaining -= qty;
            if order.remaining <= Decimal::ZERO {
                order.is_filled = true;
                order.is_open = false;
            }
        }
    }

    /// Close a resting order at the venue without filling it.
    pub fn close_order(&self, id: &str) {
        if let Some(mut order) = self.orders.get_mut(id) {
            order.is_open = false;
        }
    }

    /// Make the next `init()` call fail.
    pub fn fail_next_init(&self) {
        self.fail_init.store(true, Ordering::SeqCst);
    }

    pub fn limit_order_calls(&self) -> u64 {
        self.limit_order_calls.load(Ordering::SeqCst)
    }

    pub fn market_order_calls(&self) -> u64 {
        self.market_order_calls.load(Ordering::SeqCst)
    }

    pub fn stop_order_calls(&self) -> u64 {
        self.stop_order_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> u64 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn price_update_calls(&self) -> u64 {
        self.price_update_calls.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> u64 {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of an order by id, regardless of state.
    pub fn order_state(&self, id: &str) -> Option<OrderSnapshot> {
        self.orders.get(id).map(|o| o.snapshot())
    }

    /// Ids of all currently open orders.
    pub fn open_order_ids(&self) -> Vec<String> {
        self.orders
            .iter()
            .filter(|o| o.is_open)
            .map(|o| o.id.clone())
            .collect()
    }

    fn next_id() -> String {
        Uuid::new_v4().as_simple().to_string()
    }

    fn place(&self, symbol: &str, side: Side, amount: Decimal, price: Option<Decimal>) -> OrderRef {
        let id = Self::next_id();
        self.orders.insert(
            id.clone(),
            PaperOrder {
                id: id.clone(),
                symbol: symbol.to_string(),
                side,
                amount,
                remaining: amount,
                executed: Decimal::ZERO,
                is_open: true,
                is_filled: false,
                price,
            },
        );
        OrderRef::new(id)
    }

    fn synthesize_symbol(symbol: &str) -> SymbolInfo {
        let (base, quote) = match symbol.split_once('-') {
            Some((base, quote)) => (base.to_string(), quote.to_string()),
            None => (symbol.to_string(), "USD".to_string()),
        };
        SymbolInfo {
            symbol: symbol.to_string(),
            base,
            quote,
            min_order_size: Decimal::new(1, 4), // 0.0001
            asset_precision: 4,
            price_precision: 2,
        }
    }
}

#[async_trait]
impl ExchangeApi for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<(), ApiError> {
        if self.fail_init.swap(false, Ordering::SeqCst) {
            return Err(ApiError::Transport("simulated init failure".to_string()));
        }
        Ok(())
    }

    async fn terminate(&self) -> Result<(), ApiError> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, ApiError> {
        if let Some(info) = self.symbols.get(symbol) {
            return Ok(Some(info.clone()));
        }
        if self.auto_symbols {
            let info = Self::synthesize_symbol(symbol);
            self.symbols.insert(symbol.to_string(), info.clone());
            return Ok(Some(info));
        }
        Ok(None)
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker, ApiError> {
        if let Some(next) = self.ticker_script.lock().pop_front() {
            self.current_ticker.insert(symbol.to_string(), next);
        }
        self.current_ticker
            .get(symbol)
            .map(|t| *t)
            .or(self.default_ticker)
            .ok_or_else(|| ApiError::Transport(format!("no ticker for {symbol}")))
    }

    async fn wallet_balances(&self) -> Result<Vec<WalletBalance>, ApiError> {
        Ok(self.balances.lock().clone())
    }

    async fn limit_order(&self, req: &LimitOrderRequest) -> Result<OrderRef, ApiError> {
        self.limit_order_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.place(&req.symbol, req.side, req.amount, Some(req.price)))
    }

    async fn market_order(&self, req: &MarketOrderRequest) -> Result<OrderRef, ApiError> {
        self.market_order_calls.fetch_add(1, Ordering::SeqCst);
        let order = self.place(&req.symbol, req.side, req.amount, None);
        // Market orders execute immediately in the simulation.
        if let Some(mut o) = self.orders.get_mut(&order.id) {
            o.executed = o.amount;
            o.remaining = Decimal::ZERO;
            o.is_filled = true;
            o.is_open = false;
        }
        Ok(order)
    }

    async fn stop_order(&self, req: &StopOrderRequest) -> Result<OrderRef, ApiError> {
        self.stop_order_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.place(&req.symbol, req.side, req.amount, Some(req.price)))
    }

    async fn active_orders(&self, symbol: &str, side: Side) -> Result<Vec<OrderSnapshot>, ApiError> {
        Ok(self
            .orders
            .iter()
            .filter(|o| o.is_open && o.symbol == symbol && o.side == side)
            .map(|o| o.snapshot())
            .collect())
    }

    async fn cancel_orders(&self, orders: &[OrderRef]) -> Result<(), ApiError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        for order in orders {
            self.close_order(&order.id);
        }
        Ok(())
    }

    async fn order(&self, id: &str) -> Result<Option<OrderSnapshot>, ApiError> {
        Ok(self.orders.get(id).map(|o| o.snapshot()))
    }

    async fn update_order_price(
        &self,
        order: &OrderRef,
        price: Decimal,
    ) -> Result<OrderRef, ApiError> {
        self.price_update_calls.fetch_add(1, Ordering::SeqCst);
        let Some((_, mut existing)) = self.orders.remove(&order.id) else {
            return Err(ApiError::Rejected(format!("unknown order {}", order.id)));
        };
        if !existing.is_open {
            // Put it back untouched so the caller can still observe the fill.
            let id = existing.id.clone();
            self.orders.insert(id, existing);
            return Err(ApiError::Rejected("order is no longer open".to_string()));
        }
        // The venue re-issues the order under a fresh id.
        let new_id = Self::next_id();
        existing.id = new_id.clone();
        existing.price = Some(price);
        self.orders.insert(new_id.clone(), existing);
        Ok(OrderRef::new(new_id))
    }
}
