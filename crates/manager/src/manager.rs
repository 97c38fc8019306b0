//! The exchange manager: a reference-counted pool of open exchanges and
//! the entry point that turns one webhook message into exchange activity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine::{run_sequence, Exchange, SharedExchange, SharedNotifier};
use exchange_api::{ApiError, SharedExchangeApi};
use metrics::SharedMetrics;
use parser::{extract_alert, parse_message, CommandBlock};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::credentials::Credentials;

/// Grace period before an exchange reference is actually released, so late
/// callbacks of a finished sequence still find it open.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Builds exchange API connections for credential records.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> Result<SharedExchangeApi, ApiError>;
}

struct PoolEntry {
    exchange: SharedExchange,
    refcount: usize,
}

/// Summary of one processed message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReport {
    /// Command blocks found in the message.
    pub blocks: usize,
    /// Blocks that matched a credentials record and were dispatched.
    pub dispatched: usize,
    /// Whether an alert was forwarded to the notifier.
    pub alerted: bool,
}

/// Owns the exchange pool and dispatches parsed messages.
pub struct ExchangeManager {
    factory: Arc<dyn ConnectorFactory>,
    notifier: SharedNotifier,
    metrics: SharedMetrics,
    pool: Mutex<HashMap<Credentials, PoolEntry>>,
    polling_bounds: Option<(Duration, Duration)>,
}

impl ExchangeManager {
    pub fn new(
        factory: Arc<dyn ConnectorFactory>,
        notifier: SharedNotifier,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            factory,
            notifier,
            metrics,
            pool: Mutex::new(HashMap::new()),
            polling_bounds: None,
        }
    }

    /// Override the polling bounds of exchanges opened by this manager.
    pub fn with_polling_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.polling_bounds = Some((min, max));
        self
    }

    /// Open (or reuse) the exchange for a credentials record.
    ///
    /// A failed `init` tears the partial connection down and surfaces the
    /// error; nothing is pooled in that case.
    pub async fn open_exchange(&self, credentials: &Credentials) -> Result<SharedExchange, ApiError> {
        let mut pool = self.pool.lock().await;
        if let Some(entry) = pool.get_mut(credentials) {
            entry.refcount += 1;
            return Ok(entry.exchange.clone());
        }

        let api = self.factory.connect(credentials).await?;
        if let Err(e) = api.init().await {
            error!(exchange = %credentials.exchange, error = %e, "exchange init failed");
            if let Err(term) = api.terminate().await {
                warn!(exchange = %credentials.exchange, error = %term, "teardown after failed init");
            }
            return Err(e);
        }

        let mut exchange = Exchange::new(api, self.metrics.clone(), self.notifier.clone());
        if let Some((min, max)) = self.polling_bounds {
            exchange = exchange.with_polling_bounds(min, max);
        }
        let exchange = Arc::new(exchange);
        pool.insert(
            credentials.clone(),
            PoolEntry { exchange: exchange.clone(), refcount: 1 },
        );
        info!(exchange = %credentials.exchange, account = %credentials.name, "exchange opened");
        Ok(exchange)
    }

    /// Release one reference after the grace period; the last reference
    /// tears the connection down.
    pub async fn close_exchange(&self, credentials: &Credentials) {
        tokio::time::sleep(CLOSE_GRACE).await;

        let released = {
            let mut pool = self.pool.lock().await;
            match pool.get_mut(credentials) {
                Some(entry) => {
                    entry.refcount -= 1;
                    if entry.refcount == 0 {
                        pool.remove(credentials).map(|entry| entry.exchange)
                    } else {
                        None
                    }
                }
                None => {
                    warn!(account = %credentials.name, "close for an exchange that is not open");
                    None
                }
            }
        };

        if let Some(exchange) = released {
            if let Err(e) = exchange.api().terminate().await {
                warn!(exchange = %exchange.name(), error = %e, "terminate failed");
            }
            info!(exchange = %exchange.name(), "exchange closed");
        }
    }

    /// Number of currently pooled exchanges.
    pub async fn open_count(&self) -> usize {
        self.pool.lock().await.len()
    }

    /// Execute one webhook message against a credentials list.
    ///
    /// Blocks run concurrently across exchanges and serially within one;
    /// each block's sequence awaits its background tasks before the
    /// exchange reference is released.
    pub async fn execute_message(
        self: &Arc<Self>,
        message: &str,
        credentials: &[Credentials],
    ) -> MessageReport {
        self.metrics.inc_messages_received();
        let mut report = MessageReport::default();

        if let Some(alert) = extract_alert(message) {
            self.notifier.send(&alert).await;
            self.metrics.inc_alerts_forwarded();
            report.alerted = true;
        }

        let blocks = parse_message(message);
        report.blocks = blocks.len();

        // Group by matched credentials: sequences run in parallel across
        // exchanges but strictly in series within one exchange.
        let mut grouped: Vec<(Credentials, Vec<CommandBlock>)> = Vec::new();
        for block in blocks {
            let Some(creds) = credentials.iter().find(|c| c.matches(&block.exchange)) else {
                warn!(exchange = %block.exchange, "no credentials for exchange, block dropped");
                continue;
            };
            report.dispatched += 1;
            self.metrics.inc_blocks_dispatched();

            match grouped.iter_mut().find(|(c, _)| *c == *creds) {
                Some((_, group)) => group.push(block),
                None => grouped.push((creds.clone(), vec![block])),
            }
        }

        let mut tasks = JoinSet::new();
        for (creds, group) in grouped {
            let manager = self.clone();
            tasks.spawn(async move {
                for block in group {
                    manager.execute_block(block, creds.clone()).await;
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        report
    }

    async fn execute_block(&self, block: CommandBlock, credentials: Credentials) {
        let exchange = match self.open_exchange(&credentials).await {
            Ok(exchange) => exchange,
            Err(e) => {
                error!(exchange = %block.exchange, error = %e, "could not open exchange");
                return;
            }
        };

        if let Err(e) = exchange.add_symbol(&block.symbol).await {
            error!(symbol = %block.symbol, error = %e, "could not add symbol");
            self.close_exchange(&credentials).await;
            return;
        }

        run_sequence(exchange, &block.symbol, &block.actions).await;
        self.close_exchange(&credentials).await;
    }
}
