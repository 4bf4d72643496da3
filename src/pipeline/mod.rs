//! # Ingestion pipeline
//!
//! ```text
//! FeedClient ──RawMessage──▶ Classifier ──DomainEvent──▶ RecordStore (SQLite, capped)
//!                                                  └──▶ StatsAggregator ──watch──▶ StatsReader
//! ```
//!
//! - `types` - Domain records (Transaction, Block, AddressActivity, AddressStats)
//! - `normalizer` - Raw feed message → domain events
//! - `db` - Bounded retention store trait + SQLite implementation
//! - `stats` - Running statistics, minute buckets, snapshot publication
//! - `ingestion` - The single-task loop tying the above together
//! - `query` - Read-only facade for dashboards

pub mod db;
pub mod ingestion;
pub mod normalizer;
pub mod query;
pub mod stats;
pub mod types;

pub use db::{
    AggregateSeed, RecordFootprint, RecordStore, SqliteRetentionStore, StoreError, StoredRecord,
    UpsertOutcome, UpsertReport,
};
pub use ingestion::IngestionPipeline;
pub use normalizer::{ClassificationError, Classifier};
pub use query::{DashboardView, QueryService};
pub use stats::{MinuteBuckets, StatsAggregator, StatsReader, StatsSnapshot};
pub use types::{
    AddressActivity, AddressStats, Block, DomainEvent, RecordKind, Transaction, TransactionInput,
    TransactionOutput,
};
