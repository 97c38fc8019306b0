//! Market data and broker order types returned by the exchange API port.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::side::Side;

/// Current top-of-book prices for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
}

impl Ticker {
    /// The price a taker on the given side is quoted against:
    /// the bid for buyers, the ask for sellers.
    pub fn side_price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    /// Midpoint of bid and ask, used by price conditions.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// The most favourable of bid/ask/last for the given exit side.
    ///
    /// A seller watching for a take-profit trigger cares about the highest
    /// print, a buyer about the lowest.
    pub fn extreme(&self, side: Side) -> Decimal {
        match side {
            Side::Sell => self.bid.max(self.ask).max(self.last),
            Side::Buy => self.bid.min(self.ask).min(self.last),
        }
    }
}

/// One wallet entry reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Wallet type as reported by the venue (e.g. "exchange", "margin").
    pub wallet: String,
    /// Currency code (e.g. "BTC").
    pub currency: String,
    /// Total amount; negative for short derivative positions.
    pub amount: Decimal,
    /// Amount free to place new orders with.
    pub available: Decimal,
}

/// Handle to an order living at the broker.
///
/// The id may be replaced when the broker re-issues the order after a price
/// update, so holders must be prepared to swap it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    pub id: String,
}

impl OrderRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Point-in-time state of a broker order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub side: Side,
    /// Requested size.
    pub amount: Decimal,
    /// Size still resting.
    pub remaining: Decimal,
    /// Size already executed.
    pub executed: Decimal,
    pub is_filled: bool,
    pub is_open: bool,
    /// Current limit/stop price, when the order type has one.
    pub price: Option<Decimal>,
}

impl OrderSnapshot {
    /// Terminal without a full fill: cancelled or rejected at the venue.
    pub fn is_closed_unfilled(&self) -> bool {
        !self.is_open && !self.is_filled
    }
}
