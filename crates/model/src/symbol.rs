//! Per-symbol contract details used by normalization and order sizing.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Contract details for one tradable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Venue symbol, e.g. "BTC-PERPETUAL".
    pub symbol: String,
    /// Base asset (the thing being bought/sold), e.g. "BTC".
    pub base: String,
    /// Quote asset (the thing paid with), e.g. "USD".
    pub quote: String,
    /// Smallest order the venue accepts.
    pub min_order_size: Decimal,
    /// Decimal places of the base asset amount.
    pub asset_precision: u32,
    /// Decimal places of the price.
    pub price_precision: u32,
}

impl SymbolInfo {
    /// Round a price to this symbol's tick precision.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp_with_strategy(self.price_precision, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Round an amount down to this symbol's asset precision.
    ///
    /// Always truncates so a clamped size never exceeds the balance it was
    /// clamped against.
    pub fn round_amount(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.asset_precision, RoundingStrategy::ToZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info() -> SymbolInfo {
        SymbolInfo {
            symbol: "BTCUSD".into(),
            base: "BTC".into(),
            quote: "USD".into(),
            min_order_size: dec!(0.001),
            asset_precision: 3,
            price_precision: 1,
        }
    }

    #[test]
    fn test_round_price() {
        assert_eq!(info().round_price(dec!(100.04)), dec!(100.0));
        assert_eq!(info().round_price(dec!(100.05)), dec!(100.1));
        assert_eq!(info().round_price(dec!(100)), dec!(100));
    }

    #[test]
    fn test_round_amount_truncates() {
        assert_eq!(info().round_amount(dec!(0.0019)), dec!(0.001));
        assert_eq!(info().round_amount(dec!(1.9999)), dec!(1.999));
    }
}
