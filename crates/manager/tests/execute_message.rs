//! Message-level dispatch against paper exchanges.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine::Notifier;
use exchange_api::paper::PaperExchange;
use exchange_api::{ApiError, SharedExchangeApi};
use manager::{ConnectorFactory, Credentials, ExchangeManager};
use metrics::create_metrics;
use model::{SymbolInfo, Ticker};
use parking_lot::Mutex;
use rust_decimal_macros::dec;

/// Factory handing out pre-built paper exchanges by account name.
struct PaperFactory {
    by_name: HashMap<String, Arc<PaperExchange>>,
}

#[async_trait]
impl ConnectorFactory for PaperFactory {
    async fn connect(&self, credentials: &Credentials) -> Result<SharedExchangeApi, ApiError> {
        self.by_name
            .get(&credentials.name)
            .cloned()
            .map(|paper| paper as SharedExchangeApi)
            .ok_or_else(|| ApiError::Transport(format!("no adapter for {}", credentials.name)))
    }
}

/// Notifier that records everything it is asked to send.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) {
        self.sent.lock().push(text.to_string());
    }
}

fn paper(name: &str) -> Arc<PaperExchange> {
    let paper = Arc::new(PaperExchange::new(name));
    paper.add_symbol(SymbolInfo {
        symbol: "BTC-PERPETUAL".into(),
        base: "BTC".into(),
        quote: "USD".into(),
        min_order_size: dec!(0.001),
        asset_precision: 3,
        price_precision: 1,
    });
    paper.set_balance("BTC", dec!(10), dec!(10));
    paper.set_balance("USD", dec!(10000000), dec!(10000000));
    paper.set_ticker(
        "BTC-PERPETUAL",
        Ticker { bid: dec!(1000), ask: dec!(1001), last: dec!(1000) },
    );
    paper
}

fn manager_with(
    exchanges: &[(&str, Arc<PaperExchange>)],
) -> (Arc<ExchangeManager>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let factory = Arc::new(PaperFactory {
        by_name: exchanges
            .iter()
            .map(|(name, paper)| (name.to_string(), paper.clone()))
            .collect(),
    });
    let manager = Arc::new(
        ExchangeManager::new(factory, notifier.clone(), create_metrics())
            .with_polling_bounds(Duration::from_secs(1), Duration::from_secs(5)),
    );
    (manager, notifier)
}

#[tokio::test(start_paused = true)]
async fn parse_dispatch_places_order_and_notifies() {
    let deribit = paper("deribit");
    let (manager, notifier) = manager_with(&[("deribit", deribit.clone())]);
    let creds = vec![Credentials::new("deribit", "deribit", "k", "s")];

    let report = manager
        .execute_message(
            "deribit(BTC-PERPETUAL) { limitOrder(side=buy, amount=1, offset=100); } {!} done",
            &creds,
        )
        .await;

    assert_eq!(report.blocks, 1);
    assert_eq!(report.dispatched, 1);
    assert!(report.alerted);

    // One limit order at bid - 100.
    assert_eq!(deribit.limit_order_calls(), 1);
    let ids = deribit.open_order_ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(deribit.order_state(&ids[0]).unwrap().price, Some(dec!(900)));

    // The alert reached the notifier with blocks and marker stripped.
    assert_eq!(*notifier.sent.lock(), vec!["done".to_string()]);

    // The exchange reference was released and the connection torn down.
    assert_eq!(manager.open_count().await, 0);
    assert_eq!(deribit.terminate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn blocks_fan_out_across_exchanges() {
    let deribit = paper("deribit");
    let bitfinex = paper("bitfinex");
    let (manager, _) =
        manager_with(&[("deribit", deribit.clone()), ("bitfinex", bitfinex.clone())]);
    let creds = vec![
        Credentials::new("deribit", "deribit", "k1", "s1"),
        Credentials::new("bitfinex", "bitfinex", "k2", "s2"),
    ];

    let report = manager
        .execute_message(
            "deribit(BTC-PERPETUAL) { limitOrder(side=buy, amount=1, offset=100); } \
             bitfinex(BTC-PERPETUAL) { marketOrder(side=sell, amount=2); }",
            &creds,
        )
        .await;

    assert_eq!(report.dispatched, 2);
    assert_eq!(deribit.limit_order_calls(), 1);
    assert_eq!(bitfinex.market_order_calls(), 1);
    assert_eq!(deribit.terminate_calls(), 1);
    assert_eq!(bitfinex.terminate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn first_matching_credentials_record_wins() {
    let first = paper("main");
    let second = paper("main-backup");
    let (manager, _) = manager_with(&[("main", first.clone()), ("main-backup", second.clone())]);
    let creds = vec![
        Credentials::new("main", "deribit", "k1", "s1"),
        Credentials::new("MAIN", "deribit", "k2", "s2"),
    ];

    manager
        .execute_message("main(BTC-PERPETUAL) { marketOrder(side=buy, amount=1); }", &creds)
        .await;

    assert_eq!(first.market_order_calls(), 1);
    assert_eq!(second.market_order_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unmatched_exchange_block_is_dropped() {
    let deribit = paper("deribit");
    let (manager, notifier) = manager_with(&[("deribit", deribit.clone())]);
    let creds = vec![Credentials::new("deribit", "deribit", "k", "s")];

    let report = manager
        .execute_message("kraken(BTC-PERPETUAL) { marketOrder(side=buy, amount=1); }", &creds)
        .await;

    assert_eq!(report.blocks, 1);
    assert_eq!(report.dispatched, 0);
    assert!(notifier.sent.lock().is_empty());
    assert_eq!(manager.open_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn refcount_terminates_exactly_once() {
    let deribit = paper("deribit");
    let (manager, _) = manager_with(&[("deribit", deribit.clone())]);
    let creds = Credentials::new("deribit", "deribit", "k", "s");

    for _ in 0..3 {
        manager.open_exchange(&creds).await.unwrap();
    }
    assert_eq!(manager.open_count().await, 1);

    for _ in 0..3 {
        manager.close_exchange(&creds).await;
    }
    assert_eq!(manager.open_count().await, 0);
    assert_eq!(deribit.terminate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_reuses_pooled_exchange() {
    let deribit = paper("deribit");
    let (manager, _) = manager_with(&[("deribit", deribit.clone())]);
    let creds = Credentials::new("deribit", "deribit", "k", "s");

    let a = manager.open_exchange(&creds).await.unwrap();
    let b = manager.open_exchange(&creds).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    // Different secret means a different pool identity.
    let other = Credentials::new("deribit", "deribit", "k", "other-secret");
    let c = manager.open_exchange(&other).await.unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(manager.open_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_init_leaves_pool_empty() {
    let deribit = paper("deribit");
    deribit.fail_next_init();
    let (manager, _) = manager_with(&[("deribit", deribit.clone())]);
    let creds = Credentials::new("deribit", "deribit", "k", "s");

    assert!(manager.open_exchange(&creds).await.is_err());
    assert_eq!(manager.open_count().await, 0);
    // The partial connection was torn down.
    assert_eq!(deribit.terminate_calls(), 1);

    // A later open works again.
    assert!(manager.open_exchange(&creds).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn alert_only_message_notifies_without_blocks() {
    let deribit = paper("deribit");
    let (manager, notifier) = manager_with(&[("deribit", deribit.clone())]);
    let creds = vec![Credentials::new("deribit", "deribit", "k", "s")];

    let report = manager.execute_message("{!} breakout on the 4h", &creds).await;

    assert_eq!(report.blocks, 0);
    assert!(report.alerted);
    assert_eq!(*notifier.sent.lock(), vec!["breakout on the 4h".to_string()]);
    assert_eq!(deribit.limit_order_calls(), 0);
}
