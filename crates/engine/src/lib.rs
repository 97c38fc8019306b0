//! The command execution engine.
//!
//! This crate turns parsed command sequences into exchange activity:
//!
//! - **Argument normalizer** (`args`): merges passed arguments with
//!   per-command defaults and computes side, price and size
//! - **Exchange runtime** (`exchange`): the per-connection handle owning
//!   the symbol table, session store, algo registry and background tasks
//! - **Scheduler** (`scheduler`): serial foreground execution with a shared
//!   polling loop for commands that suspend
//! - **Commands** (`commands`): the full catalogue from `limitOrder` to
//!   `trailingTakeProfit`
//!
//! Commands communicate with the scheduler only through
//! [`CommandState`] and with each other through the session store and the
//! algo registry on their exchange handle.

pub mod args;
pub mod catalogue;
pub mod command;
pub mod commands;
pub mod error;
pub mod exchange;
pub mod notify;
pub mod registry;
pub mod scheduler;
pub mod session;

pub use args::{normalize, ArgSpec, NormalizedArgs};
pub use command::{Command, CommandContext, CommandState};
pub use error::EngineError;
pub use exchange::{Exchange, SharedExchange};
pub use notify::{create_log_notifier, LogNotifier, Notifier, SharedNotifier};
pub use registry::{AlgoEntry, AlgoRegistry, CancelScope};
pub use scheduler::run_sequence;
pub use session::SessionStore;
