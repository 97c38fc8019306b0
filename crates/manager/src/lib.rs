//! Exchange management: the credential-keyed pool of open exchanges and
//! the message dispatch entry point.
//!
//! A message arrives as a string plus a credentials list. The manager
//! extracts the operator alert, parses the command blocks, joins each
//! block to the first matching credentials record and runs the blocks
//! concurrently, one serial command sequence per exchange.

mod credentials;
mod manager;

pub use credentials::Credentials;
pub use manager::{ConnectorFactory, ExchangeManager, MessageReport};
