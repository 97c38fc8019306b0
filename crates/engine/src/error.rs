//! Engine error types.

use thiserror::Error;

/// Errors raised while normalizing arguments or executing commands.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An argument failed validation; aborts the command and its block.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The computed order size is zero; aborts only the current command.
    #[error("computed order size is zero: {0}")]
    ZeroSize(String),

    /// Flow control requested a clean, silent stop of the current block.
    ///
    /// Not an operator-visible failure: the sequence runner short-circuits
    /// without logging an error.
    #[error("sequence aborted")]
    AbortSequence,

    /// An exchange API call failed.
    #[error(transparent)]
    Api(#[from] exchange_api::ApiError),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn zero_size(msg: impl Into<String>) -> Self {
        Self::ZeroSize(msg.into())
    }
}
