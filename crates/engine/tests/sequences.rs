//! Sequence-level behavior: ordering, aborts and cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use engine::{create_log_notifier, run_sequence, Exchange, SharedExchange};
use exchange_api::paper::PaperExchange;
use metrics::create_metrics;
use model::{SymbolInfo, Ticker};
use parser::parse_actions;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SYMBOL: &str = "BTC-PERPETUAL";

fn paper() -> Arc<PaperExchange> {
    let paper = Arc::new(PaperExchange::new("deribit"));
    paper.add_symbol(SymbolInfo {
        symbol: SYMBOL.into(),
        base: "BTC".into(),
        quote: "USD".into(),
        min_order_size: dec!(0.001),
        asset_precision: 3,
        price_precision: 1,
    });
    paper.set_balance("BTC", dec!(10), dec!(10));
    paper.set_balance("USD", dec!(10000000), dec!(10000000));
    paper.set_ticker(
        SYMBOL,
        Ticker { bid: dec!(1000), ask: dec!(1001), last: dec!(1000) },
    );
    paper
}

async fn exchange_on(paper: Arc<PaperExchange>) -> SharedExchange {
    let ex = Arc::new(
        Exchange::new(paper, create_metrics(), create_log_notifier())
            .with_polling_bounds(Duration::from_secs(1), Duration::from_secs(5)),
    );
    ex.add_symbol(SYMBOL).await.unwrap();
    ex
}

#[tokio::test]
async fn limit_orders_run_in_program_order() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    let actions = parse_actions(
        "limitOrder(side=buy, amount=1, offset=100); \
         limitOrder(side=buy, amount=1, offset=200);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    assert_eq!(paper.limit_order_calls(), 2);
    let mut prices: Vec<Decimal> = paper
        .open_order_ids()
        .iter()
        .filter_map(|id| paper.order_state(id).unwrap().price)
        .collect();
    prices.sort();
    assert_eq!(prices, vec![dec!(800), dec!(900)]);
    // Session state is torn down with the sequence.
    assert!(ex.sessions().is_empty());
    assert!(ex.registry().is_empty());
}

#[tokio::test]
async fn continue_if_false_stops_block_silently() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    // Mid price is 1000.5, so priceGreaterThan=2000 is false.
    let actions = parse_actions(
        "continueIf(if=priceGreaterThan, value=2000); \
         limitOrder(side=buy, amount=1, offset=100);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    assert_eq!(paper.limit_order_calls(), 0);
    // Flow control is not an error.
    assert_eq!(ex.metrics().command_errors(), 0);
}

#[tokio::test]
async fn stop_if_true_stops_block_silently() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    let actions = parse_actions(
        "stopIf(if=priceLessThan, value=2000); \
         limitOrder(side=buy, amount=1, offset=100);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    assert_eq!(paper.limit_order_calls(), 0);
    assert_eq!(ex.metrics().command_errors(), 0);
}

#[tokio::test]
async fn invalid_argument_aborts_block() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    let actions = parse_actions(
        "limitOrder(side=hold, amount=1, offset=100); \
         limitOrder(side=buy, amount=1, offset=100);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    // The bad side aborts the whole block before anything is placed.
    assert_eq!(paper.limit_order_calls(), 0);
    assert_eq!(ex.metrics().command_errors(), 1);
}

#[tokio::test]
async fn zero_size_skips_only_the_command() {
    let paper = paper();
    // Selling with an empty BTC wallet clamps to zero.
    paper.set_balance("BTC", dec!(0), dec!(0));
    let ex = exchange_on(paper.clone()).await;

    let actions = parse_actions(
        "limitOrder(side=sell, amount=1, offset=100); \
         limitOrder(side=buy, amount=1, offset=100);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    // The sell was skipped, the buy still ran.
    assert_eq!(paper.limit_order_calls(), 1);
    assert_eq!(ex.metrics().command_errors(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_delays_the_next_action() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    let start = tokio::time::Instant::now();
    let actions = parse_actions("wait(30s); limitOrder(side=buy, amount=1, offset=100);");
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(paper.limit_order_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_orders_stops_backgrounded_trailing_stop() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    let actions = parse_actions(
        "trailingStop(side=sell, offset=100, amount=1, background=true); \
         cancelOrders(which=session);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    // The backgrounded loop observed the cancel on its next wake, ran its
    // cancel hook and removed itself from the registry.
    assert_eq!(paper.stop_order_calls(), 1);
    assert_eq!(paper.cancel_calls(), 1);
    assert!(paper.open_order_ids().is_empty());
    assert!(ex.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn background_trailing_stop_runs_while_sequence_continues() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    // The trailing stop parks in the background; the following limit order
    // must be placed without waiting for it. The stop then fills, so the
    // sequence's final background wait completes.
    let paper2 = paper.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        for id in paper2.open_order_ids() {
            if paper2.order_state(&id).unwrap().price == Some(dec!(900)) {
                paper2.fill_order(&id, dec!(1));
            }
        }
    });

    let actions = parse_actions(
        "trailingStop(side=sell, offset=100, amount=1, background=true); \
         limitOrder(side=buy, amount=1, offset=100);",
    );
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    assert_eq!(paper.stop_order_calls(), 1);
    assert_eq!(paper.limit_order_calls(), 1);
    assert!(ex.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_exchange_feature_is_silent_noop() {
    let paper = paper();
    let ex = exchange_on(paper.clone()).await;

    let actions = parse_actions("notSupported(); limitOrder(side=buy, amount=1, offset=100);");
    run_sequence(ex.clone(), SYMBOL, &actions).await;

    assert_eq!(paper.limit_order_calls(), 1);
    assert_eq!(ex.metrics().command_errors(), 0);
}
