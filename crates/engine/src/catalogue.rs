//! Action-name to command lookup.

use tracing::warn;

use crate::command::Command;
use crate::commands::{
    AggressiveEntry, CancelOrders, ContinueIf, LimitOrder, MarketOrder, NotSupported, Notify,
    ScaledOrder, StopAndTakeProfitOrder, StopIf, StopMarketOrder, TrailingStop, TrailingTakeProfit,
    Wait,
};

/// Build the command for an action name (case-insensitive).
///
/// Unknown names get the no-op substitute; that is a log line, never an
/// error.
pub fn build(name: &str) -> Box<dyn Command> {
    match name.to_lowercase().as_str() {
        "limitorder" => Box::new(LimitOrder::default()),
        "marketorder" => Box::new(MarketOrder::default()),
        "stopmarketorder" => Box::new(StopMarketOrder::default()),
        "scaledorder" => Box::new(ScaledOrder::default()),
        "trailingstop" => Box::new(TrailingStop::default()),
        "trailingtakeprofit" => Box::new(TrailingTakeProfit::default()),
        "aggressiveentry" => Box::new(AggressiveEntry::default()),
        "stopandtakeprofitorder" => Box::new(StopAndTakeProfitOrder::default()),
        "wait" => Box::new(Wait::default()),
        "continueif" => Box::new(ContinueIf::default()),
        "stopif" => Box::new(StopIf::default()),
        "notify" => Box::new(Notify::default()),
        "cancelorders" => Box::new(CancelOrders::default()),
        "notsupported" => Box::new(NotSupported::default()),
        other => {
            warn!(command = %other, "unknown command, substituting no-op");
            Box::new(NotSupported::new(other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_resolve() {
        assert_eq!(build("limitOrder").name(), "limitOrder");
        assert_eq!(build("LIMITORDER").name(), "limitOrder");
        assert_eq!(build("trailingTakeProfit").name(), "trailingTakeProfit");
        assert_eq!(build("cancelOrders").name(), "cancelOrders");
    }

    #[test]
    fn test_unknown_name_is_noop() {
        assert_eq!(build("doTheThing").name(), "notSupported");
    }
}
