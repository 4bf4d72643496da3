//! Running network statistics
//!
//! Totals track what the store holds: inserts add, evictions and overwrites
//! subtract using the footprints the store reports back. Per-minute counts use
//! the event time carried by the feed, capped a little past the moment the row
//! was stored so one skewed timestamp cannot run the window ahead of the feed.
//! Last-hour counts go by when rows were stored.
//!
//! Snapshots are immutable `Arc`s published on a `watch` channel, so readers
//! never observe a half-applied event.

use crate::pipeline::db::{AggregateSeed, RecordFootprint, UpsertOutcome, UpsertReport};
use crate::pipeline::types::{sats_to_btc, Block, DomainEvent, Transaction};
use crate::streamer_core::ConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

pub const MINUTE_SLOTS: usize = 60;
pub const RECENT_HIGH_VALUE: usize = 10;
pub const RECENT_BLOCKS: usize = 5;
/// Consecutive store failures before the store is reported unhealthy
pub const STORE_FAILURE_LIMIT: u32 = 3;
/// How far past its storage time a feed timestamp may still count as-is
pub const MAX_FUTURE_SKEW_SECS: i64 = 120;

/// Event time as the per-minute window sees it
pub fn window_time(time: i64, stored_at: i64) -> i64 {
    time.min(stored_at.saturating_add(MAX_FUTURE_SKEW_SECS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MinuteCount {
    /// Unix minute (seconds / 60)
    pub minute: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct MinuteSlot {
    minute: i64,
    count: u64,
}

/// 60 circular per-minute counters keyed by `minute % 60`.
///
/// A slot belongs to whichever minute last touched it; reading a minute the
/// slot no longer holds yields zero, so a gap needs no sweeping.
#[derive(Debug, Clone)]
pub struct MinuteBuckets {
    slots: [MinuteSlot; MINUTE_SLOTS],
    latest_minute: Option<i64>,
}

impl Default for MinuteBuckets {
    fn default() -> Self {
        Self::new()
    }
}

impl MinuteBuckets {
    pub fn new() -> Self {
        Self {
            slots: [MinuteSlot::default(); MINUTE_SLOTS],
            latest_minute: None,
        }
    }

    pub fn minute_of(time: i64) -> i64 {
        time.div_euclid(60)
    }

    fn index(minute: i64) -> usize {
        minute.rem_euclid(MINUTE_SLOTS as i64) as usize
    }

    pub fn latest_minute(&self) -> Option<i64> {
        self.latest_minute
    }

    /// Count one event. Events older than the trailing window are ignored.
    pub fn record(&mut self, time: i64) {
        self.add(Self::minute_of(time), 1);
    }

    fn add(&mut self, minute: i64, count: u64) {
        if let Some(latest) = self.latest_minute {
            if minute <= latest - MINUTE_SLOTS as i64 {
                return;
            }
        }

        let slot = &mut self.slots[Self::index(minute)];
        if slot.minute != minute {
            *slot = MinuteSlot { minute, count: 0 };
        }
        slot.count += count;

        self.latest_minute = Some(self.latest_minute.map_or(minute, |latest| latest.max(minute)));
    }

    /// Undo one `record` for an event that left the store
    pub fn remove(&mut self, time: i64) {
        let minute = Self::minute_of(time);
        let slot = &mut self.slots[Self::index(minute)];
        if slot.minute == minute && slot.count > 0 {
            slot.count -= 1;
        }
    }

    pub fn count_at(&self, minute: i64) -> u64 {
        let slot = &self.slots[Self::index(minute)];
        if slot.minute == minute {
            slot.count
        } else {
            0
        }
    }

    /// Sum over the `minutes` minutes ending at the latest event minute
    pub fn trailing_sum(&self, minutes: usize) -> u64 {
        match self.latest_minute {
            Some(latest) => self.sum_ending_at(latest, minutes),
            None => 0,
        }
    }

    /// Sum over the `minutes` minutes ending at `minute`
    pub fn sum_ending_at(&self, minute: i64, minutes: usize) -> u64 {
        let span = minutes.min(MINUTE_SLOTS) as i64;
        (minute - span + 1..=minute).map(|m| self.count_at(m)).sum()
    }

    /// The trailing 60 minutes, oldest first
    pub fn trailing(&self) -> Vec<MinuteCount> {
        let Some(latest) = self.latest_minute else {
            return Vec::new();
        };
        (latest - MINUTE_SLOTS as i64 + 1..=latest)
            .map(|minute| MinuteCount {
                minute,
                count: self.count_at(minute),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighValueTx {
    pub hash: String,
    pub total_output_value: u64,
    pub fee: Option<u64>,
    pub time: i64,
}

impl HighValueTx {
    pub fn btc(&self) -> f64 {
        sats_to_btc(self.total_output_value)
    }
}

impl From<&Transaction> for HighValueTx {
    fn from(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash.clone(),
            total_output_value: tx.total_output_value,
            fee: tx.fee,
            time: tx.time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub hash: String,
    pub height: u64,
    pub time: i64,
    pub n_tx: u64,
    pub size: u64,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash.clone(),
            height: block.height,
            time: block.time,
            n_tx: block.n_tx,
            size: block.size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub stored_transactions: u64,
    pub stored_blocks: u64,
    pub latest_block_height: Option<u64>,
    /// Mean fee in satoshis over stored transactions with a known fee
    pub average_fee: Option<f64>,
    /// Sum of output values over stored transactions, in satoshis
    pub total_volume: u64,
    /// Stored transactions written in the last 60 wall-clock minutes
    pub transactions_last_hour: u64,
    pub blocks_last_hour: u64,
    pub last_5_minutes: u64,
    /// Trailing 60 minutes, oldest first
    pub per_minute: Vec<MinuteCount>,
    pub events_received: u64,
    pub transactions_received: u64,
    pub blocks_received: u64,
    pub address_events: u64,
    pub classification_errors: u64,
    pub store_errors: u64,
    pub store_healthy: bool,
    pub connection_state: ConnectionState,
    pub last_event_at: Option<DateTime<Utc>>,
    /// Newest first
    pub recent_high_value: Vec<HighValueTx>,
    /// Newest first
    pub recent_blocks: Vec<BlockSummary>,
    pub uptime_secs: i64,
    /// Transactions received per minute of uptime
    pub transactions_per_minute: f64,
    pub updated_at: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn log_summary(&self) {
        log::info!("📊 Network statistics");
        log::info!(
            "   ├─ Runtime: {}s, {} transactions received ({:.1}/min)",
            self.uptime_secs,
            self.transactions_received,
            self.transactions_per_minute
        );
        log::info!(
            "   ├─ Stored: {} transactions, {} blocks, {:.8} BTC volume",
            self.stored_transactions,
            self.stored_blocks,
            sats_to_btc(self.total_volume)
        );
        log::info!(
            "   ├─ Last hour: {} transactions, {} blocks",
            self.transactions_last_hour,
            self.blocks_last_hour
        );
        match self.latest_block_height {
            Some(height) => log::info!("   ├─ Latest block: #{}", height),
            None => log::info!("   ├─ Latest block: none yet"),
        }
        match self.average_fee {
            Some(fee) => log::info!("   ├─ Average fee: {:.0} sats", fee),
            None => log::info!("   ├─ Average fee: unknown"),
        }
        log::info!("   ├─ Last 5 minutes: {} transactions", self.last_5_minutes);
        log::info!(
            "   ├─ Received: {} events ({} dropped, {} store errors)",
            self.events_received,
            self.classification_errors,
            self.store_errors
        );
        log::info!(
            "   └─ Feed: {}, store {}",
            self.connection_state.as_str(),
            if self.store_healthy { "healthy" } else { "DEGRADED" }
        );
    }
}

/// Read side of the aggregator, cheap to clone
#[derive(Clone)]
pub struct StatsReader {
    rx: watch::Receiver<Arc<StatsSnapshot>>,
}

impl StatsReader {
    pub fn latest(&self) -> Arc<StatsSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication. Returns false once the aggregator is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

pub struct StatsAggregator {
    stored_transactions: u64,
    stored_blocks: u64,
    latest_block_height: Option<u64>,
    fee_sum: u64,
    fee_count: u64,
    total_volume: u64,
    buckets: MinuteBuckets,
    /// Transactions by the minute they were stored
    stored_buckets: MinuteBuckets,
    block_stored_buckets: MinuteBuckets,
    started_at: DateTime<Utc>,
    events_received: u64,
    transactions_received: u64,
    blocks_received: u64,
    address_events: u64,
    classification_errors: u64,
    store_errors: u64,
    consecutive_store_failures: u32,
    connection_state: ConnectionState,
    last_event_at: Option<DateTime<Utc>>,
    recent_high_value: VecDeque<HighValueTx>,
    recent_blocks: VecDeque<BlockSummary>,
    publisher: watch::Sender<Arc<StatsSnapshot>>,
}

impl StatsAggregator {
    pub fn new() -> (Self, StatsReader) {
        Self::from_seed(&AggregateSeed::default())
    }

    /// Resume from what the store already holds
    pub fn from_seed(seed: &AggregateSeed) -> (Self, StatsReader) {
        let seeded = |counts: &[(i64, u64)]| {
            let mut buckets = MinuteBuckets::new();
            for (minute, count) in counts {
                buckets.add(*minute, *count);
            }
            buckets
        };

        let mut aggregator = Self {
            stored_transactions: seed.transaction_count,
            stored_blocks: seed.block_count,
            latest_block_height: seed.latest_block_height,
            fee_sum: seed.fee_sum,
            fee_count: seed.fee_count,
            total_volume: seed.total_volume,
            buckets: seeded(&seed.minute_counts),
            stored_buckets: seeded(&seed.stored_minute_counts),
            block_stored_buckets: seeded(&seed.block_stored_minute_counts),
            started_at: Utc::now(),
            events_received: 0,
            transactions_received: 0,
            blocks_received: 0,
            address_events: 0,
            classification_errors: 0,
            store_errors: 0,
            consecutive_store_failures: 0,
            connection_state: ConnectionState::Disconnected,
            last_event_at: None,
            recent_high_value: seed
                .recent_high_value
                .iter()
                .take(RECENT_HIGH_VALUE)
                .map(HighValueTx::from)
                .collect(),
            recent_blocks: seed
                .recent_blocks
                .iter()
                .take(RECENT_BLOCKS)
                .map(BlockSummary::from)
                .collect(),
            publisher: watch::channel(Arc::new(empty_snapshot())).0,
        };

        let snapshot = aggregator.snapshot();
        let (publisher, rx) = watch::channel(snapshot);
        aggregator.publisher = publisher;

        (aggregator, StatsReader { rx })
    }

    pub fn reader(&self) -> StatsReader {
        StatsReader {
            rx: self.publisher.subscribe(),
        }
    }

    /// Fold one classified event in. `report` is the store's answer for the
    /// event, `None` when the store write failed.
    pub fn on_event(&mut self, event: &DomainEvent, report: Option<&UpsertReport>) {
        self.events_received += 1;
        self.last_event_at = Some(Utc::now());

        // Only what the store actually holds makes it into totals and lists
        match event {
            DomainEvent::Transaction(tx) => {
                self.transactions_received += 1;
                if let Some(report) = report {
                    self.apply_transaction(tx, report);
                }
            }
            DomainEvent::Block(block) => {
                self.blocks_received += 1;
                if let Some(report) = report {
                    self.apply_block(block, report);
                }
            }
            DomainEvent::AddressActivity(_) => self.address_events += 1,
        }

        self.publish();
    }

    pub fn record_classification_error(&mut self) {
        self.classification_errors += 1;
        self.publish();
    }

    /// Returns true when this failure tipped the store into unhealthy
    pub fn record_store_error(&mut self) -> bool {
        self.store_errors += 1;
        self.consecutive_store_failures += 1;
        self.publish();
        self.consecutive_store_failures == STORE_FAILURE_LIMIT
    }

    /// Returns true when this success brought an unhealthy store back
    pub fn record_store_success(&mut self) -> bool {
        let recovered = self.consecutive_store_failures >= STORE_FAILURE_LIMIT;
        if self.consecutive_store_failures > 0 {
            self.consecutive_store_failures = 0;
            self.publish();
        }
        recovered
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection_state != state {
            self.connection_state = state;
            self.publish();
        }
    }

    pub fn store_healthy(&self) -> bool {
        self.consecutive_store_failures < STORE_FAILURE_LIMIT
    }

    pub fn stored_transactions(&self) -> u64 {
        self.stored_transactions
    }

    /// Publish a fresh snapshot even without new events, so wall-clock
    /// figures roll forward
    pub fn refresh(&self) -> Arc<StatsSnapshot> {
        let snapshot = self.snapshot();
        self.publisher.send_replace(snapshot.clone());
        snapshot
    }

    pub fn snapshot(&self) -> Arc<StatsSnapshot> {
        let now = Utc::now();
        let now_minute = MinuteBuckets::minute_of(now.timestamp());
        let uptime_secs = (now - self.started_at).num_seconds().max(0);
        let transactions_per_minute = if uptime_secs > 0 {
            self.transactions_received as f64 * 60.0 / uptime_secs as f64
        } else {
            0.0
        };

        Arc::new(StatsSnapshot {
            stored_transactions: self.stored_transactions,
            stored_blocks: self.stored_blocks,
            latest_block_height: self.latest_block_height,
            average_fee: (self.fee_count > 0).then(|| self.fee_sum as f64 / self.fee_count as f64),
            total_volume: self.total_volume,
            transactions_last_hour: self.stored_buckets.sum_ending_at(now_minute, MINUTE_SLOTS),
            blocks_last_hour: self.block_stored_buckets.sum_ending_at(now_minute, MINUTE_SLOTS),
            last_5_minutes: self.buckets.trailing_sum(5),
            per_minute: self.buckets.trailing(),
            events_received: self.events_received,
            transactions_received: self.transactions_received,
            blocks_received: self.blocks_received,
            address_events: self.address_events,
            classification_errors: self.classification_errors,
            store_errors: self.store_errors,
            store_healthy: self.store_healthy(),
            connection_state: self.connection_state,
            last_event_at: self.last_event_at,
            recent_high_value: self.recent_high_value.iter().cloned().collect(),
            recent_blocks: self.recent_blocks.iter().cloned().collect(),
            uptime_secs,
            transactions_per_minute,
            updated_at: now,
        })
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }

    fn apply_transaction(&mut self, tx: &Transaction, report: &UpsertReport) {
        match report.outcome {
            UpsertOutcome::Ignored => return,
            UpsertOutcome::Inserted => self.stored_transactions += 1,
            UpsertOutcome::Replaced => {
                if let Some(previous) = report.replaced {
                    self.forget_transaction(previous);
                }
            }
        }

        let written = report
            .stored
            .unwrap_or_else(|| RecordFootprint::of_transaction(tx, Utc::now().timestamp()));
        if let Some(fee) = written.fee {
            self.fee_sum = self.fee_sum.saturating_add(fee);
            self.fee_count += 1;
        }
        self.total_volume = self.total_volume.saturating_add(written.value);
        self.buckets.record(written.window_time());
        self.stored_buckets.record(written.stored_at);

        for removed in &report.removed {
            self.stored_transactions = self.stored_transactions.saturating_sub(1);
            self.forget_transaction(*removed);
        }

        if tx.is_high_value {
            self.remember_high_value(tx);
        }
    }

    /// Take a stored transaction's contribution back out
    fn forget_transaction(&mut self, footprint: RecordFootprint) {
        if let Some(fee) = footprint.fee {
            self.fee_sum = self.fee_sum.saturating_sub(fee);
            self.fee_count = self.fee_count.saturating_sub(1);
        }
        self.total_volume = self.total_volume.saturating_sub(footprint.value);
        self.buckets.remove(footprint.window_time());
        self.stored_buckets.remove(footprint.stored_at);
    }

    fn apply_block(&mut self, block: &Block, report: &UpsertReport) {
        match report.outcome {
            UpsertOutcome::Ignored => return,
            UpsertOutcome::Inserted => {
                self.stored_blocks = (self.stored_blocks + 1).saturating_sub(report.evicted as u64);
                self.latest_block_height = Some(block.height);
            }
            UpsertOutcome::Replaced => {
                if let Some(previous) = report.replaced {
                    self.block_stored_buckets.remove(previous.stored_at);
                }
            }
        }

        let written = report
            .stored
            .unwrap_or_else(|| RecordFootprint::of_block(block, Utc::now().timestamp()));
        self.block_stored_buckets.record(written.stored_at);
        for removed in &report.removed {
            self.block_stored_buckets.remove(removed.stored_at);
        }

        self.remember_block(block);
    }

    fn remember_high_value(&mut self, tx: &Transaction) {
        self.recent_high_value.retain(|entry| entry.hash != tx.hash);
        self.recent_high_value.push_front(HighValueTx::from(tx));
        self.recent_high_value.truncate(RECENT_HIGH_VALUE);
    }

    fn remember_block(&mut self, block: &Block) {
        self.recent_blocks.retain(|entry| entry.hash != block.hash);
        self.recent_blocks.push_front(BlockSummary::from(block));
        self.recent_blocks.truncate(RECENT_BLOCKS);
    }
}

fn empty_snapshot() -> StatsSnapshot {
    StatsSnapshot {
        stored_transactions: 0,
        stored_blocks: 0,
        latest_block_height: None,
        average_fee: None,
        total_volume: 0,
        transactions_last_hour: 0,
        blocks_last_hour: 0,
        last_5_minutes: 0,
        per_minute: Vec::new(),
        events_received: 0,
        transactions_received: 0,
        blocks_received: 0,
        address_events: 0,
        classification_errors: 0,
        store_errors: 0,
        store_healthy: true,
        connection_state: ConnectionState::Disconnected,
        last_event_at: None,
        recent_high_value: Vec::new(),
        recent_blocks: Vec::new(),
        uptime_secs: 0,
        transactions_per_minute: 0.0,
        updated_at: Utc::now(),
    }
}
