//! The ingestion loop: feed → classifier → store → aggregator
//!
//! One task owns the pipeline and handles each message to completion before
//! asking the feed for the next one. A failure on one message (bad payload,
//! store error) is logged and counted; it never stops the loop.

use super::db::{RecordStore, StoreError, UpsertOutcome, UpsertReport};
use super::normalizer::Classifier;
use super::stats::{StatsAggregator, StatsReader, STORE_FAILURE_LIMIT};
use super::types::DomainEvent;
use crate::streamer_core::{FeedClient, FeedHandle, RawMessage};
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Stored transactions between statistics log lines
pub const STATS_LOG_EVERY: u64 = 100;
pub const DEFAULT_STATS_LOG_INTERVAL: Duration = Duration::from_secs(300);

pub struct IngestionPipeline {
    classifier: Classifier,
    store: Arc<dyn RecordStore>,
    aggregator: StatsAggregator,
    stats_log_interval: Duration,
    stored_transactions_seen: u64,
}

impl IngestionPipeline {
    pub fn new(classifier: Classifier, store: Arc<dyn RecordStore>, aggregator: StatsAggregator) -> Self {
        Self {
            classifier,
            store,
            aggregator,
            stats_log_interval: DEFAULT_STATS_LOG_INTERVAL,
            stored_transactions_seen: 0,
        }
    }

    pub fn with_stats_log_interval(mut self, interval: Duration) -> Self {
        self.stats_log_interval = interval;
        self
    }

    pub fn reader(&self) -> StatsReader {
        self.aggregator.reader()
    }

    /// Start watching an address at runtime: persisted, classified and
    /// subscribed on the live session. Returns false if it was already watched.
    pub async fn watch_address(&mut self, handle: &FeedHandle, address: &str) -> Result<bool, StoreError> {
        if !self.classifier.monitor(address) {
            return Ok(false);
        }
        self.store
            .register_address(address, chrono::Utc::now().timestamp())
            .await?;
        if !handle.add_address(address) {
            log::warn!("⚠️  Feed client gone, {} will not be subscribed", address);
        }
        log::info!("👀 Watching address: {}", address);
        Ok(true)
    }

    /// Stop watching an address: no more activity events, `addr_unsub` on the
    /// live session, and no replay on reconnect. Its stored counters stay.
    /// Returns false if it was not watched.
    pub fn unwatch_address(&mut self, handle: &FeedHandle, address: &str) -> bool {
        if !self.classifier.unmonitor(address) {
            return false;
        }
        if !handle.remove_address(address) {
            log::warn!("⚠️  Feed client gone, {} stays subscribed until disconnect", address);
        }
        log::info!("🙈 Stopped watching address: {}", address);
        true
    }

    /// Classify, persist and aggregate one message. Returns how many events
    /// changed the store.
    pub async fn process(&mut self, message: &RawMessage) -> usize {
        let events = match self.classifier.classify(message) {
            Ok(events) => events,
            Err(e) => {
                log::warn!("⚠️  Dropping '{}' message: {}", message.op, e);
                self.aggregator.record_classification_error();
                return 0;
            }
        };

        let mut changed = 0;
        for event in &events {
            let report = self.persist(event).await;
            if report.as_ref().is_some_and(|r| r.outcome != UpsertOutcome::Ignored) {
                changed += 1;
            }
            self.log_event(event, report.as_ref());
            self.aggregator.on_event(event, report.as_ref());

            let inserted_tx = matches!(event, DomainEvent::Transaction(_))
                && report.as_ref().is_some_and(|r| r.is_new());
            if inserted_tx {
                self.stored_transactions_seen += 1;
                if self.stored_transactions_seen % STATS_LOG_EVERY == 0 {
                    self.aggregator.snapshot().log_summary();
                }
            }
        }

        changed
    }

    /// Drive the feed until it shuts down
    pub async fn run(&mut self, mut client: FeedClient) {
        log::info!("🚀 Starting ingestion pipeline");
        log::info!("   ├─ Watched addresses: {}", self.classifier.monitored().len());
        log::info!(
            "   ├─ High-value threshold: {} sats",
            self.classifier.high_value_threshold()
        );
        log::info!("   └─ Stats every {}s", self.stats_log_interval.as_secs());

        let mut state_rx = client.watch_state();
        let mut stats_timer = interval_at(
            Instant::now() + self.stats_log_interval,
            self.stats_log_interval,
        );
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // next_message is not cancel-safe, so it is pinned and polled to
            // completion while the other branches come and go.
            let next = client.next_message();
            tokio::pin!(next);

            let message = loop {
                tokio::select! {
                    message = &mut next => break message,
                    Ok(()) = state_rx.changed() => {
                        let state = *state_rx.borrow_and_update();
                        self.aggregator.set_connection_state(state);
                    }
                    _ = stats_timer.tick() => self.aggregator.refresh().log_summary(),
                }
            };

            match message {
                Some(message) => {
                    self.process(&message).await;
                }
                None => break,
            }
        }

        self.aggregator.set_connection_state(client.state());
        log::info!(
            "🛑 Ingestion stopped ({} frames dropped by the feed client)",
            client.dropped_frames()
        );
        self.aggregator.snapshot().log_summary();
    }

    async fn persist(&mut self, event: &DomainEvent) -> Option<UpsertReport> {
        let result = match event {
            DomainEvent::Transaction(tx) => self.store.upsert_transaction(tx).await,
            DomainEvent::Block(block) => self.store.upsert_block(block).await,
            DomainEvent::AddressActivity(activity) => {
                self.store.upsert_address_activity(activity).await
            }
        };

        match result {
            Ok(report) => {
                if self.aggregator.record_store_success() {
                    log::info!("✅ Store recovered");
                }
                Some(report)
            }
            Err(e) => {
                log::error!("❌ Failed to store {}: {}", event.kind().as_str(), e);
                if self.aggregator.record_store_error() {
                    log::error!(
                        "🚨 Store unhealthy after {} consecutive failures",
                        STORE_FAILURE_LIMIT
                    );
                }
                None
            }
        }
    }

    fn log_event(&self, event: &DomainEvent, report: Option<&UpsertReport>) {
        let outcome = report.map(|r| r.outcome);
        if outcome == Some(UpsertOutcome::Ignored) {
            log::debug!("Duplicate {} ignored", event.kind().as_str());
            return;
        }
        if let Some(report) = report {
            if report.evicted > 0 {
                log::debug!("🗑️  Evicted {} old {} record(s)", report.evicted, event.kind().as_str());
            }
        }

        match event {
            DomainEvent::Transaction(tx) => {
                if tx.is_high_value {
                    log::info!(
                        "🐋 High-value transaction: {} ({:.8} BTC)",
                        tx.hash,
                        tx.output_btc()
                    );
                }
            }
            DomainEvent::Block(block) => {
                log::info!(
                    "⛏️  New block #{} {} ({} transactions)",
                    block.height,
                    block.hash,
                    block.n_tx
                );
            }
            DomainEvent::AddressActivity(activity) => {
                log::warn!(
                    "👀 Activity on {}: +{} / -{} sats (tx {})",
                    activity.address,
                    activity.received,
                    activity.sent,
                    activity.tx_hash
                );
            }
        }
    }
}
