use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe metrics collector for the command engine.
#[derive(Debug)]
pub struct EngineMetrics {
    // Counters
    messages_received: AtomicU64,
    alerts_forwarded: AtomicU64,
    blocks_dispatched: AtomicU64,
    commands_started: AtomicU64,
    command_errors: AtomicU64,
    orders_placed: AtomicU64,
    orders_cancelled: AtomicU64,
    price_updates: AtomicU64,

    // Timestamps
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_message_time: Option<Instant>,
    last_error_time: Option<Instant>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            alerts_forwarded: AtomicU64::new(0),
            blocks_dispatched: AtomicU64::new(0),
            commands_started: AtomicU64::new(0),
            command_errors: AtomicU64::new(0),
            orders_placed: AtomicU64::new(0),
            orders_cancelled: AtomicU64::new(0),
            price_updates: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_message_time: None,
                last_error_time: None,
            }),
        }
    }

    // --- Increment methods ---

    pub fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_message_time = Some(Instant::now());
    }

    pub fn inc_alerts_forwarded(&self) {
        self.alerts_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocks_dispatched(&self) {
        self.blocks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_commands_started(&self) {
        self.commands_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_command_errors(&self) {
        self.command_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_orders_placed(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_cancelled(&self) {
        self.orders_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_price_updates(&self) {
        self.price_updates.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn alerts_forwarded(&self) -> u64 {
        self.alerts_forwarded.load(Ordering::Relaxed)
    }

    pub fn blocks_dispatched(&self) -> u64 {
        self.blocks_dispatched.load(Ordering::Relaxed)
    }

    pub fn commands_started(&self) -> u64 {
        self.commands_started.load(Ordering::Relaxed)
    }

    pub fn command_errors(&self) -> u64 {
        self.command_errors.load(Ordering::Relaxed)
    }

    pub fn orders_placed(&self) -> u64 {
        self.orders_placed.load(Ordering::Relaxed)
    }

    pub fn orders_cancelled(&self) -> u64 {
        self.orders_cancelled.load(Ordering::Relaxed)
    }

    pub fn price_updates(&self) -> u64 {
        self.price_updates.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_message(&self) -> Option<f64> {
        self.inner
            .read()
            .last_message_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received(),
            alerts_forwarded: self.alerts_forwarded(),
            blocks_dispatched: self.blocks_dispatched(),
            commands_started: self.commands_started(),
            command_errors: self.command_errors(),
            orders_placed: self.orders_placed(),
            orders_cancelled: self.orders_cancelled(),
            price_updates: self.price_updates(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_message: self.secs_since_last_message(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub alerts_forwarded: u64,
    pub blocks_dispatched: u64,
    pub commands_started: u64,
    pub command_errors: u64,
    pub orders_placed: u64,
    pub orders_cancelled: u64,
    pub price_updates: u64,
    pub uptime_secs: f64,
    pub secs_since_last_message: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health status of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Commands are executing normally.
    Healthy,
    /// A notable share of commands is failing.
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
        }
    }
}

impl MetricsSnapshot {
    /// Command failure ratio above which the engine counts as degraded.
    const DEGRADED_ERROR_RATIO: f64 = 0.1;

    /// Determine the health status based on metrics.
    pub fn health_status(&self) -> HealthStatus {
        if self.commands_started == 0 {
            return HealthStatus::Healthy;
        }
        let ratio = self.command_errors as f64 / self.commands_started as f64;
        if ratio > Self::DEGRADED_ERROR_RATIO {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Engine Metrics ===")?;
        writeln!(f, "Uptime:            {:.1}s", self.uptime_secs)?;
        writeln!(f, "Messages received: {}", self.messages_received)?;
        writeln!(f, "Alerts forwarded:  {}", self.alerts_forwarded)?;
        writeln!(f, "Blocks dispatched: {}", self.blocks_dispatched)?;
        writeln!(f, "Commands started:  {}", self.commands_started)?;
        writeln!(f, "Command errors:    {}", self.command_errors)?;
        writeln!(f, "Orders placed:     {}", self.orders_placed)?;
        writeln!(f, "Orders cancelled:  {}", self.orders_cancelled)?;
        writeln!(f, "Price updates:     {}", self.price_updates)?;
        if let Some(secs) = self.secs_since_last_message {
            writeln!(f, "Since last msg:    {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:  {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<EngineMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(EngineMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = EngineMetrics::new();

        metrics.inc_messages_received();
        metrics.inc_commands_started();
        metrics.inc_commands_started();
        metrics.inc_orders_placed();

        assert_eq!(metrics.messages_received(), 1);
        assert_eq!(metrics.commands_started(), 2);
        assert_eq!(metrics.orders_placed(), 1);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = EngineMetrics::new();

        metrics.inc_blocks_dispatched();
        metrics.inc_command_errors();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks_dispatched, 1);
        assert_eq!(snapshot.command_errors, 1);
        assert!(snapshot.uptime_secs >= 0.0);
    }

    #[test]
    fn test_last_message_time() {
        let metrics = EngineMetrics::new();

        assert!(metrics.secs_since_last_message().is_none());

        metrics.inc_messages_received();

        let secs = metrics.secs_since_last_message();
        assert!(secs.is_some());
        assert!(secs.unwrap() < 1.0);
    }

    #[test]
    fn test_health_healthy_when_idle() {
        let metrics = EngineMetrics::new();
        assert_eq!(metrics.snapshot().health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_degraded_on_error_ratio() {
        let metrics = EngineMetrics::new();
        for _ in 0..10 {
            metrics.inc_commands_started();
        }
        metrics.inc_command_errors();
        assert_eq!(metrics.snapshot().health_status(), HealthStatus::Healthy);

        metrics.inc_command_errors();
        assert_eq!(metrics.snapshot().health_status(), HealthStatus::Degraded);
    }
}
