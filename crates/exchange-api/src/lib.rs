//! The exchange API port.
//!
//! Every per-venue adapter implements [`ExchangeApi`]; the engine only ever
//! talks through this trait. Each call is a single stateless operation that
//! returns eventually and may fail. The [`paper`] module provides an
//! in-memory implementation used for dry runs and tests.

pub mod paper;

use std::sync::Arc;

use async_trait::async_trait;
use model::{OrderRef, OrderSnapshot, Side, SymbolInfo, Ticker, Trigger, WalletBalance};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by exchange API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never completed (network failure, timeout, null response).
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue understood and refused the request.
    #[error("rejected by exchange: {0}")]
    Rejected(String),

    /// The adapter does not implement this capability.
    #[error("not supported: {0}")]
    NotSupported(String),
}

/// Parameters for a limit order.
#[derive(Debug, Clone)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub amount: Decimal,
    pub price: Decimal,
    pub post_only: bool,
    pub reduce_only: bool,
}

/// Parameters for a market order.
#[derive(Debug, Clone)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub amount: Decimal,
    /// Close out the whole position regardless of `amount`.
    pub is_everything: bool,
}

/// Parameters for a stop-market order.
#[derive(Debug, Clone)]
pub struct StopOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub amount: Decimal,
    pub price: Decimal,
    pub trigger: Trigger,
}

/// Low-level capabilities of one exchange connection.
///
/// Implementations are stateless from the engine's point of view: all
/// engine-side state (sessions, algo orders, polling) lives above this trait.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Venue name this connection talks to.
    fn name(&self) -> &str;

    /// Establish the connection. Called once before any other method.
    async fn init(&self) -> Result<(), ApiError>;

    /// Tear the connection down. Called once, last.
    async fn terminate(&self) -> Result<(), ApiError>;

    /// Look up contract details for a symbol, `None` when unknown.
    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>, ApiError>;

    /// Current top-of-book prices.
    async fn ticker(&self, symbol: &str) -> Result<Ticker, ApiError>;

    /// All wallet balances for the account.
    async fn wallet_balances(&self) -> Result<Vec<WalletBalance>, ApiError>;

    /// Place a limit order.
    async fn limit_order(&self, req: &LimitOrderRequest) -> Result<OrderRef, ApiError>;

    /// Place a market order.
    async fn market_order(&self, req: &MarketOrderRequest) -> Result<OrderRef, ApiError>;

    /// Place a stop-market order.
    async fn stop_order(&self, req: &StopOrderRequest) -> Result<OrderRef, ApiError>;

    /// Open orders for a symbol and side.
    async fn active_orders(&self, symbol: &str, side: Side) -> Result<Vec<OrderSnapshot>, ApiError>;

    /// Cancel a set of orders. Unknown ids are ignored.
    async fn cancel_orders(&self, orders: &[OrderRef]) -> Result<(), ApiError>;

    /// Query one order by id, `None` when the venue no longer knows it.
    async fn order(&self, id: &str) -> Result<Option<OrderSnapshot>, ApiError>;

    /// Move an order to a new price.
    ///
    /// The returned ref may carry a different id when the venue re-issues
    /// the order instead of amending it in place.
    async fn update_order_price(&self, order: &OrderRef, price: Decimal)
        -> Result<OrderRef, ApiError>;
}

/// Shared handle to an exchange API implementation.
pub type SharedExchangeApi = Arc<dyn ExchangeApi>;
