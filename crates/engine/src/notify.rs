//! Outbound notification port.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

/// A sink for operator-facing messages (chat, e-mail, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Shared handle to a notifier.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Default notifier that writes through the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) {
        info!(text = %text, "notification");
    }
}

/// Create a shared log-backed notifier.
pub fn create_log_notifier() -> SharedNotifier {
    Arc::new(LogNotifier)
}
