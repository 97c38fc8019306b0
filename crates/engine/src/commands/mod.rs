//! The command catalogue.

mod aggressive_entry;
mod cancel;
mod flow;
mod limit;
mod market;
mod not_supported;
mod notify;
mod scaled;
mod stop_market;
mod stop_take_profit;
mod trailing_stop;
mod trailing_take_profit;

pub use aggressive_entry::AggressiveEntry;
pub use cancel::CancelOrders;
pub use flow::{ContinueIf, StopIf, Wait};
pub use limit::LimitOrder;
pub use market::MarketOrder;
pub use not_supported::NotSupported;
pub use notify::Notify;
pub use scaled::ScaledOrder;
pub use stop_market::StopMarketOrder;
pub use stop_take_profit::StopAndTakeProfitOrder;
pub use trailing_stop::TrailingStop;
pub use trailing_take_profit::TrailingTakeProfit;
