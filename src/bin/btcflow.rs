//! btcflow - live Bitcoin feed ingestion
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin btcflow
//! ```
//!
//! Configuration comes from the environment (or `.env`), see `config.rs`.
//! Ctrl+C / SIGTERM stop the feed cleanly; the store is left consistent.

use btcflow::config::RuntimeConfig;
use btcflow::pipeline::{Classifier, IngestionPipeline, RecordStore, SqliteRetentionStore, StatsAggregator};
use btcflow::streamer_core::{FeedClient, FeedHandle, SubscriptionSet, WsConnector};
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = RuntimeConfig::from_env()?;

    btcflow::logging::init_logger(&config.rust_log, config.log_file.as_deref())?;

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("⚠️  TLS crypto provider already installed, keeping it");
    }

    info!("🚀 Starting btcflow");
    info!("   ├─ Feed: {}", config.feed.ws_url);
    info!("   ├─ Database: {}", config.retention.db_path);
    info!(
        "   ├─ Streams: unconfirmed={} blocks={}",
        config.feed.subscribe_unconfirmed, config.feed.subscribe_blocks
    );
    info!("   ├─ Watched addresses: {}", config.monitored_addresses.len());
    info!("   └─ Log file: {}", config.log_file.as_deref().unwrap_or("(stderr only)"));

    let store = Arc::new(SqliteRetentionStore::open(&config.retention)?);

    let now = chrono::Utc::now().timestamp();
    for address in &config.monitored_addresses {
        store.register_address(address, now).await?;
    }

    let seed = store.aggregate_seed(config.high_value_threshold).await?;
    info!(
        "📂 Resuming with {} stored transactions, {} blocks",
        seed.transaction_count, seed.block_count
    );
    let (aggregator, _reader) = StatsAggregator::from_seed(&seed);

    let classifier = Classifier::new(&config.monitored_addresses, config.high_value_threshold);
    let subscriptions = SubscriptionSet::from_config(&config.feed, &config.monitored_addresses);
    let connector = WsConnector::new(config.feed.ws_url.clone(), config.feed.handshake_timeout);
    let (client, handle) = FeedClient::connect(Box::new(connector), config.feed.clone(), subscriptions);

    spawn_signal_listener(handle);

    let mut pipeline = IngestionPipeline::new(classifier, store, aggregator);
    pipeline.run(client).await;

    info!("✅ btcflow stopped");
    Ok(())
}

/// Ctrl+C (and SIGTERM on unix) request a cooperative feed shutdown
fn spawn_signal_listener(handle: FeedHandle) {
    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Ctrl+C received, shutting down");
                ctrl_c_handle.shutdown();
            }
            Err(e) => error!("❌ Failed to listen for Ctrl+C: {}", e),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("🛑 SIGTERM received, shutting down");
                handle.shutdown();
            }
            Err(e) => error!("❌ Failed to install SIGTERM handler: {}", e),
        }
    });
}
