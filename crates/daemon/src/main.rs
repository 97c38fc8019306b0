//! Trading automation daemon entry point.
//!
//! Takes one webhook-style message (argument or stdin), joins its command
//! blocks to the configured credentials and executes them through the
//! exchange manager. Until a live venue adapter is wired in, every
//! credentials record is served by the in-memory paper exchange, which
//! makes this binary a dry-run harness for message sequences.
//!
//! # Usage
//!
//! ```bash
//! # Execute a message directly
//! tradehook 'deribit(BTC-PERPETUAL) { limitOrder(side=buy, amount=1, offset=100); }'
//!
//! # Read the message from stdin
//! echo '...' | tradehook -
//!
//! # With a config file
//! tradehook --config accounts.toml 'deribit(BTC-PERPETUAL) { ... }'
//! ```

mod config;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use engine::create_log_notifier;
use exchange_api::paper::PaperExchange;
use exchange_api::{ApiError, SharedExchangeApi};
use manager::{ConnectorFactory, Credentials, ExchangeManager};
use metrics::create_metrics;
use model::Ticker;
use rust_decimal::Decimal;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "tradehook.toml";

fn print_usage() {
    eprintln!("Usage: tradehook [OPTIONS] [MESSAGE | -]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>   Credentials/config file (default: {DEFAULT_CONFIG})");
    eprintln!("  --help            Show this help message");
    eprintln!();
    eprintln!("The message may be passed as arguments or piped on stdin ('-').");
    eprintln!("Without a config file, a paper account is synthesized for every");
    eprintln!("exchange the message addresses, so sequences dry-run out of the box.");
    eprintln!();
    eprintln!("Environment variables:");
    eprintln!("  RUST_LOG             Log filter (default: info)");
    eprintln!("  TRADEHOOK_CONFIG     Config file path (overridden by --config)");
}

/// Serves every credentials record with an in-memory paper exchange.
struct PaperFactory;

#[async_trait]
impl ConnectorFactory for PaperFactory {
    async fn connect(&self, credentials: &Credentials) -> Result<SharedExchangeApi, ApiError> {
        info!(
            exchange = %credentials.exchange,
            account = %credentials.name,
            "connecting paper exchange (dry run)"
        );
        let paper = PaperExchange::new(credentials.exchange.clone())
            .with_auto_symbols()
            .with_default_ticker(Ticker {
                bid: Decimal::from(30_000),
                ask: Decimal::from(30_001),
                last: Decimal::from(30_000),
            });
        paper.set_balance("USD", Decimal::from(1_000_000), Decimal::from(1_000_000));
        paper.set_balance("BTC", Decimal::from(10), Decimal::from(10));
        Ok(Arc::new(paper))
    }
}

#[tokio::main]
async fn main() {
    // Load .env before reading any configuration from the environment.
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("Loaded environment from: {}", path.display()),
        Err(dotenvy::Error::Io(_)) => {} // No .env file, that's fine
        Err(e) => eprintln!("Warning: Failed to load .env file: {}", e),
    }

    common::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path: Option<PathBuf> = None;
    let mut message_parts: Vec<String> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => match iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("--config needs a path");
                    print_usage();
                    std::process::exit(1);
                }
            },
            "--help" | "-h" => {
                print_usage();
                return;
            }
            "-" => message_parts.push(read_stdin()),
            s if s.starts_with('-') => {
                eprintln!("Unknown option: {}", s);
                print_usage();
                std::process::exit(1);
            }
            part => message_parts.push(part.to_string()),
        }
    }

    let message = if message_parts.is_empty() {
        read_stdin()
    } else {
        message_parts.join(" ")
    };
    if message.trim().is_empty() {
        eprintln!("No message given");
        print_usage();
        std::process::exit(1);
    }

    let config_path = config_path
        .or_else(|| std::env::var("TRADEHOOK_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = match config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let mut credentials = config.credentials;
    if credentials.is_empty() {
        // Dry-run convenience: a paper account for every exchange the
        // message mentions.
        for block in parser::parse_message(&message) {
            if !credentials.iter().any(|c: &Credentials| c.matches(&block.exchange)) {
                warn!(exchange = %block.exchange, "no credentials configured, using paper account");
                credentials.push(Credentials::new(
                    block.exchange.clone(),
                    block.exchange.clone(),
                    "paper",
                    "paper",
                ));
            }
        }
    }

    let metrics = create_metrics();
    let (min_poll, max_poll) = config.engine.polling_bounds();
    let manager = Arc::new(
        ExchangeManager::new(Arc::new(PaperFactory), create_log_notifier(), metrics.clone())
            .with_polling_bounds(min_poll, max_poll),
    );

    info!(config = %config_path.display(), "executing message");
    let report = manager.execute_message(&message, &credentials).await;
    info!(
        blocks = report.blocks,
        dispatched = report.dispatched,
        alerted = report.alerted,
        "message processed"
    );

    println!("\n{}", metrics.snapshot());
}

fn read_stdin() -> String {
    let mut buffer = String::new();
    if std::io::stdin().read_to_string(&mut buffer).is_err() {
        eprintln!("Failed to read message from stdin");
        std::process::exit(1);
    }
    buffer
}
