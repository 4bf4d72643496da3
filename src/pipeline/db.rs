//! Bounded retention store
//!
//! Tables (see `/sql/`):
//! - `transactions` (+ `transaction_inputs`, `transaction_outputs`) - capped, FIFO by `seq`
//! - `blocks` - capped, FIFO by `seq`
//! - `address_subscriptions` - capped, FIFO by first registration; counters mutate in place
//! - `address_activity` - `(address, tx_hash)` ledger that makes counter updates idempotent
//!
//! Every upsert and the eviction it triggers commit in one SQLite transaction,
//! so no reader ever sees a table above its cap.

use crate::config::{DuplicatePolicy, RetentionConfig};
use crate::pipeline::stats::{window_time, MAX_FUTURE_SKEW_SECS};
use crate::pipeline::types::{
    AddressActivity, AddressStats, Block, RecordKind, Transaction, TransactionInput,
    TransactionOutput,
};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Schema files, applied in order. All statements use IF NOT EXISTS.
const SCHEMA: &[(&str, &str)] = &[
    ("00_transactions.sql", include_str!("../../sql/00_transactions.sql")),
    ("01_blocks.sql", include_str!("../../sql/01_blocks.sql")),
    ("02_addresses.sql", include_str!("../../sql/02_addresses.sql")),
];

const TX_COLUMNS: &str = "hash, tx_index, time, size, version, lock_time, relayed_by, \
     total_input_value, total_output_value, fee, is_high_value";

const BLOCK_COLUMNS: &str = "hash, height, time, size, n_tx, merkle_root, nonce, bits, version, \
     block_index, prev_block_index, prev_block_hash, total_btc_sent, estimated_btc_sent, reward";

/// Columns read into a `RecordFootprint`, per table
const TX_FOOTPRINT: &str = "time, stored_at, fee, total_output_value";
const BLOCK_FOOTPRINT: &str = "time, stored_at, NULL, 0";

const ADDRESS_COLUMNS: &str =
    "address, subscribed_at, transaction_count, total_received, total_sent, last_activity";

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    LockPoisoned,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {}", e),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::LockPoisoned => write!(f, "Store connection lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Io(e) => Some(e),
            StoreError::LockPoisoned => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Key already present and the duplicate policy kept the stored copy
    Ignored,
    /// Key already present and the stored fields were overwritten in place
    Replaced,
}

/// The parts of a stored transaction or block the aggregator keeps totals over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFootprint {
    /// Event time from the feed
    pub time: i64,
    /// Wall-clock second the row was written
    pub stored_at: i64,
    /// Always `None` for blocks
    pub fee: Option<u64>,
    /// Total output value; zero for blocks
    pub value: u64,
}

impl RecordFootprint {
    pub fn of_transaction(tx: &Transaction, stored_at: i64) -> Self {
        Self {
            time: tx.time,
            stored_at,
            fee: tx.fee,
            value: tx.total_output_value,
        }
    }

    pub fn of_block(block: &Block, stored_at: i64) -> Self {
        Self {
            time: block.time,
            stored_at,
            fee: None,
            value: 0,
        }
    }

    /// The time per-minute windows count this row under
    pub fn window_time(&self) -> i64 {
        window_time(self.time, self.stored_at)
    }
}

/// What one upsert did to the store, including anything it evicted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub outcome: UpsertOutcome,
    /// Rows of the same kind removed to stay under the cap
    pub evicted: usize,
    /// Footprints of evicted transactions or blocks (empty for addresses)
    pub removed: Vec<RecordFootprint>,
    /// Footprint of the row an overwrite replaced
    pub replaced: Option<RecordFootprint>,
    /// Footprint of the transaction or block row as written
    pub stored: Option<RecordFootprint>,
}

impl UpsertReport {
    pub fn ignored() -> Self {
        Self {
            outcome: UpsertOutcome::Ignored,
            evicted: 0,
            removed: Vec::new(),
            replaced: None,
            stored: None,
        }
    }

    fn inserted(evicted: usize, removed: Vec<RecordFootprint>, stored: Option<RecordFootprint>) -> Self {
        Self {
            outcome: UpsertOutcome::Inserted,
            evicted,
            removed,
            replaced: None,
            stored,
        }
    }

    fn replaced(previous: Option<RecordFootprint>, stored: RecordFootprint) -> Self {
        Self {
            outcome: UpsertOutcome::Replaced,
            evicted: 0,
            removed: Vec::new(),
            replaced: previous,
            stored: Some(stored),
        }
    }

    pub fn is_new(&self) -> bool {
        self.outcome == UpsertOutcome::Inserted
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    Transaction(Transaction),
    Block(Block),
    Address(AddressStats),
}

/// Everything the aggregator needs to resume after a restart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSeed {
    pub transaction_count: u64,
    pub block_count: u64,
    pub fee_sum: u64,
    pub fee_count: u64,
    /// Sum of `total_output_value` over stored transactions
    pub total_volume: u64,
    pub latest_block_height: Option<u64>,
    /// `(minute, count)` by window time, for the 60 minutes ending at the
    /// newest stored transaction
    pub minute_counts: Vec<(i64, u64)>,
    /// `(minute, count)` of transactions by `stored_at`, last 60 wall-clock minutes
    pub stored_minute_counts: Vec<(i64, u64)>,
    /// `(minute, count)` of blocks by `stored_at`, last 60 wall-clock minutes
    pub block_stored_minute_counts: Vec<(i64, u64)>,
    /// Newest first
    pub recent_high_value: Vec<Transaction>,
    /// Newest first
    pub recent_blocks: Vec<Block>,
}

/// Persistence seam between the ingestion loop and SQLite.
///
/// Upserts are idempotent on the record key. Reads only ever see committed
/// state.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert_transaction(&self, tx: &Transaction) -> Result<UpsertReport, StoreError>;

    async fn upsert_block(&self, block: &Block) -> Result<UpsertReport, StoreError>;

    /// Applies the activity to the address counters once per `(address, tx_hash)`
    async fn upsert_address_activity(
        &self,
        activity: &AddressActivity,
    ) -> Result<UpsertReport, StoreError>;

    /// Record a watched address. Re-registering keeps the first `subscribed_at`.
    async fn register_address(
        &self,
        address: &str,
        subscribed_at: i64,
    ) -> Result<UpsertReport, StoreError>;

    /// Newest first
    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError>;

    /// Newest first
    async fn recent_blocks(&self, limit: usize) -> Result<Vec<Block>, StoreError>;

    /// Most recently registered first
    async fn recent_addresses(&self, limit: usize) -> Result<Vec<AddressStats>, StoreError>;

    /// Transactions whose total output is strictly above `threshold`, newest first
    async fn query_high_value(
        &self,
        threshold: u64,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn query_by_address(&self, address: &str) -> Result<Option<AddressStats>, StoreError>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;

    /// Also serves previous-hash lookups; the chain itself is never validated
    async fn get_block(&self, hash: &str) -> Result<Option<Block>, StoreError>;

    async fn count(&self, kind: RecordKind) -> Result<u64, StoreError>;

    async fn aggregate_seed(&self, high_value_threshold: u64) -> Result<AggregateSeed, StoreError>;

    async fn query_recent(
        &self,
        kind: RecordKind,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let records = match kind {
            RecordKind::Transaction => self
                .recent_transactions(limit)
                .await?
                .into_iter()
                .map(StoredRecord::Transaction)
                .collect(),
            RecordKind::Block => self
                .recent_blocks(limit)
                .await?
                .into_iter()
                .map(StoredRecord::Block)
                .collect(),
            RecordKind::Address => self
                .recent_addresses(limit)
                .await?
                .into_iter()
                .map(StoredRecord::Address)
                .collect(),
        };
        Ok(records)
    }
}

/// Apply the embedded schema files in order
pub fn run_schema_migrations(conn: &Connection) -> Result<(), StoreError> {
    log::info!("🔧 Running schema migrations");
    for (name, sql) in SCHEMA {
        conn.execute_batch(sql)?;
        log::debug!("   ├─ ✅ {}", name);
    }
    log::info!("✅ Schema ready ({} files)", SCHEMA.len());
    Ok(())
}

/// SQLite retention store.
///
/// One writer connection serializes all mutations. File-backed stores get a
/// second connection for reads so queries run against the last committed WAL
/// snapshot without waiting on the writer lock; in-memory stores share the
/// writer.
pub struct SqliteRetentionStore {
    writer: Arc<Mutex<Connection>>,
    reader: Option<Arc<Mutex<Connection>>>,
    config: RetentionConfig,
}

impl SqliteRetentionStore {
    pub fn open(config: &RetentionConfig) -> Result<Self, StoreError> {
        let in_memory = config.db_path == ":memory:";

        if !in_memory {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let writer = Connection::open(&config.db_path)?;
        apply_optimized_pragmas(&writer)?;
        run_schema_migrations(&writer)?;

        let reader = if in_memory {
            None
        } else {
            let reader = Connection::open(&config.db_path)?;
            apply_optimized_pragmas(&reader)?;
            reader.pragma_update(None, "query_only", "ON")?;
            Some(Arc::new(Mutex::new(reader)))
        };

        log::info!(
            "📂 Retention store open: {} (caps: {} txs, {} blocks, {} addresses, duplicates: {:?})",
            config.db_path,
            config.max_transactions,
            config.max_blocks,
            config.max_addresses,
            config.duplicate_policy
        );

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.writer.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        match &self.reader {
            Some(reader) => reader.lock().map_err(|_| StoreError::LockPoisoned),
            None => self.writer(),
        }
    }

    fn write_transaction(&self, record: &Transaction) -> Result<UpsertReport, StoreError> {
        let mut conn = self.writer()?;
        let db_tx = conn.transaction()?;

        let previous = db_tx
            .query_row(
                &format!("SELECT {} FROM transactions WHERE hash = ?1", TX_FOOTPRINT),
                [&record.hash],
                row_to_footprint,
            )
            .optional()?;

        let now = chrono::Utc::now().timestamp();
        let written = RecordFootprint::of_transaction(record, now);

        let report = match (previous, self.config.duplicate_policy) {
            (Some(_), DuplicatePolicy::Ignore) => return Ok(UpsertReport::ignored()),
            (Some(prev), DuplicatePolicy::Overwrite) => {
                db_tx.execute(
                    r#"
                    UPDATE transactions SET
                        tx_index = ?2, time = ?3, size = ?4, version = ?5, lock_time = ?6,
                        relayed_by = ?7, total_input_value = ?8, total_output_value = ?9,
                        fee = ?10, is_high_value = ?11, stored_at = ?12
                    WHERE hash = ?1
                    "#,
                    params![
                        record.hash,
                        record.tx_index,
                        record.time,
                        record.size,
                        record.version,
                        record.lock_time,
                        record.relayed_by,
                        record.total_input_value.map(to_i64),
                        to_i64(record.total_output_value),
                        record.fee.map(to_i64),
                        record.is_high_value,
                        now,
                    ],
                )?;
                db_tx.execute("DELETE FROM transaction_inputs WHERE tx_hash = ?1", [&record.hash])?;
                db_tx.execute("DELETE FROM transaction_outputs WHERE tx_hash = ?1", [&record.hash])?;
                insert_children(&db_tx, record)?;

                UpsertReport::replaced(Some(prev), written)
            }
            (None, _) => {
                db_tx.execute(
                    r#"
                    INSERT INTO transactions (
                        hash, tx_index, time, size, version, lock_time, relayed_by,
                        total_input_value, total_output_value, fee, is_high_value, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                    params![
                        record.hash,
                        record.tx_index,
                        record.time,
                        record.size,
                        record.version,
                        record.lock_time,
                        record.relayed_by,
                        record.total_input_value.map(to_i64),
                        to_i64(record.total_output_value),
                        record.fee.map(to_i64),
                        record.is_high_value,
                        now,
                    ],
                )?;
                insert_children(&db_tx, record)?;

                let removed =
                    evict_with_footprints(&db_tx, "transactions", TX_FOOTPRINT, self.config.max_transactions)?;
                UpsertReport::inserted(removed.len(), removed, Some(written))
            }
        };

        db_tx.commit()?;
        Ok(report)
    }

    fn write_block(&self, block: &Block) -> Result<UpsertReport, StoreError> {
        let mut conn = self.writer()?;
        let db_tx = conn.transaction()?;

        let previous = db_tx
            .query_row(
                &format!("SELECT {} FROM blocks WHERE hash = ?1", BLOCK_FOOTPRINT),
                [&block.hash],
                row_to_footprint,
            )
            .optional()?;

        if previous.is_some() && self.config.duplicate_policy == DuplicatePolicy::Ignore {
            return Ok(UpsertReport::ignored());
        }

        let now = chrono::Utc::now().timestamp();
        let written = RecordFootprint::of_block(block, now);

        // The conflict arm only runs under Overwrite; seq is left alone so the
        // block keeps its place in the eviction order.
        db_tx.execute(
            r#"
            INSERT INTO blocks (
                hash, height, time, size, n_tx, merkle_root, nonce, bits, version,
                block_index, prev_block_index, prev_block_hash,
                total_btc_sent, estimated_btc_sent, reward, stored_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(hash) DO UPDATE SET
                height = excluded.height,
                time = excluded.time,
                size = excluded.size,
                n_tx = excluded.n_tx,
                merkle_root = excluded.merkle_root,
                nonce = excluded.nonce,
                bits = excluded.bits,
                version = excluded.version,
                block_index = excluded.block_index,
                prev_block_index = excluded.prev_block_index,
                prev_block_hash = excluded.prev_block_hash,
                total_btc_sent = excluded.total_btc_sent,
                estimated_btc_sent = excluded.estimated_btc_sent,
                reward = excluded.reward,
                stored_at = excluded.stored_at
            "#,
            params![
                block.hash,
                to_i64(block.height),
                block.time,
                to_i64(block.size),
                to_i64(block.n_tx),
                block.merkle_root,
                to_i64(block.nonce),
                to_i64(block.bits),
                block.version,
                block.block_index,
                block.prev_block_index,
                block.prev_block_hash,
                block.total_btc_sent.map(to_i64),
                block.estimated_btc_sent.map(to_i64),
                block.reward.map(to_i64),
                now,
            ],
        )?;

        let report = match previous {
            Some(prev) => UpsertReport::replaced(Some(prev), written),
            None => {
                let removed =
                    evict_with_footprints(&db_tx, "blocks", BLOCK_FOOTPRINT, self.config.max_blocks)?;
                UpsertReport::inserted(removed.len(), removed, Some(written))
            }
        };

        db_tx.commit()?;
        Ok(report)
    }

    fn write_address_activity(&self, activity: &AddressActivity) -> Result<UpsertReport, StoreError> {
        let mut conn = self.writer()?;
        let db_tx = conn.transaction()?;

        let recorded = db_tx.execute(
            r#"
            INSERT OR IGNORE INTO address_activity (address, tx_hash, received, sent, time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                activity.address,
                activity.tx_hash,
                to_i64(activity.received),
                to_i64(activity.sent),
                activity.time,
            ],
        )?;

        if recorded == 0 {
            return Ok(UpsertReport::ignored());
        }

        let created = db_tx
            .query_row(
                "SELECT 1 FROM address_subscriptions WHERE address = ?1",
                [&activity.address],
                |_| Ok(()),
            )
            .optional()?
            .is_none();

        db_tx.execute(
            r#"
            INSERT INTO address_subscriptions (
                address, subscribed_at, transaction_count, total_received, total_sent, last_activity
            ) VALUES (?1, NULL, 1, ?2, ?3, ?4)
            ON CONFLICT(address) DO UPDATE SET
                transaction_count = transaction_count + 1,
                total_received = total_received + excluded.total_received,
                total_sent = total_sent + excluded.total_sent,
                last_activity = MAX(COALESCE(last_activity, excluded.last_activity), excluded.last_activity)
            "#,
            params![
                activity.address,
                to_i64(activity.received),
                to_i64(activity.sent),
                activity.time,
            ],
        )?;

        let evicted = if created {
            evict_addresses(&db_tx, self.config.max_addresses)?
        } else {
            0
        };
        evict_oldest(&db_tx, "address_activity", self.config.max_transactions)?;

        db_tx.commit()?;

        Ok(UpsertReport::inserted(evicted, Vec::new(), None))
    }

    fn write_registration(&self, address: &str, subscribed_at: i64) -> Result<UpsertReport, StoreError> {
        let mut conn = self.writer()?;
        let db_tx = conn.transaction()?;

        let inserted = db_tx.execute(
            "INSERT OR IGNORE INTO address_subscriptions (address, subscribed_at) VALUES (?1, ?2)",
            params![address, subscribed_at],
        )?;

        let report = if inserted == 1 {
            let evicted = evict_addresses(&db_tx, self.config.max_addresses)?;
            UpsertReport::inserted(evicted, Vec::new(), None)
        } else {
            // Rows created by activity before registration get their timestamp now
            db_tx.execute(
                "UPDATE address_subscriptions SET subscribed_at = ?2 WHERE address = ?1 AND subscribed_at IS NULL",
                params![address, subscribed_at],
            )?;
            UpsertReport::ignored()
        };

        db_tx.commit()?;
        Ok(report)
    }

    /// Run `f` inside one read transaction on the reader connection, so a
    /// multi-statement read sees a single committed snapshot
    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut conn = self.reader()?;
        let snapshot = conn.transaction()?;
        let value = f(&snapshot)?;
        snapshot.finish()?;
        Ok(value)
    }

    fn read_seed(conn: &Connection, high_value_threshold: u64) -> Result<AggregateSeed, StoreError> {
        let (transaction_count, fee_sum, fee_count, total_volume): (i64, i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(fee), 0), COUNT(fee), COALESCE(SUM(total_output_value), 0) FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let block_count = count_rows(conn, "blocks")?;

        let latest_block_height = conn
            .query_row("SELECT height FROM blocks ORDER BY seq DESC LIMIT 1", [], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
            .map(to_u64);

        // Same cap as `window_time`: a skewed feed timestamp cannot drag the
        // window past the ingestion clock
        let minute_counts = select_minute_counts(
            conn,
            r#"
            SELECT MIN(time, stored_at + ?1) / 60 AS minute, COUNT(*) FROM transactions
            WHERE MIN(time, stored_at + ?1) / 60 >
                (SELECT MAX(MIN(time, stored_at + ?1)) / 60 FROM transactions) - 60
            GROUP BY minute
            ORDER BY minute
            "#,
            MAX_FUTURE_SKEW_SECS,
        )?;

        let now_minute = chrono::Utc::now().timestamp().div_euclid(60);
        let stored_minute_counts = select_minute_counts(
            conn,
            r#"
            SELECT stored_at / 60 AS minute, COUNT(*) FROM transactions
            WHERE stored_at / 60 > ?1 - 60
            GROUP BY minute
            ORDER BY minute
            "#,
            now_minute,
        )?;
        let block_stored_minute_counts = select_minute_counts(
            conn,
            r#"
            SELECT stored_at / 60 AS minute, COUNT(*) FROM blocks
            WHERE stored_at / 60 > ?1 - 60
            GROUP BY minute
            ORDER BY minute
            "#,
            now_minute,
        )?;

        let recent_high_value = select_high_value(conn, high_value_threshold, 10)?;
        let recent_blocks = select_recent_blocks(conn, 5)?;

        Ok(AggregateSeed {
            transaction_count: to_u64(transaction_count),
            block_count: to_u64(block_count),
            fee_sum: to_u64(fee_sum),
            fee_count: to_u64(fee_count),
            total_volume: to_u64(total_volume),
            latest_block_height,
            minute_counts,
            stored_minute_counts,
            block_stored_minute_counts,
            recent_high_value,
            recent_blocks,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRetentionStore {
    async fn upsert_transaction(&self, tx: &Transaction) -> Result<UpsertReport, StoreError> {
        self.write_transaction(tx)
    }

    async fn upsert_block(&self, block: &Block) -> Result<UpsertReport, StoreError> {
        self.write_block(block)
    }

    async fn upsert_address_activity(
        &self,
        activity: &AddressActivity,
    ) -> Result<UpsertReport, StoreError> {
        self.write_address_activity(activity)
    }

    async fn register_address(
        &self,
        address: &str,
        subscribed_at: i64,
    ) -> Result<UpsertReport, StoreError> {
        self.write_registration(address, subscribed_at)
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!("SELECT {} FROM transactions ORDER BY seq DESC LIMIT ?1", TX_COLUMNS);
        self.read(|conn| select_transactions(conn, &sql, params![to_limit(limit)]))
    }

    async fn recent_blocks(&self, limit: usize) -> Result<Vec<Block>, StoreError> {
        self.read(|conn| select_recent_blocks(conn, limit))
    }

    async fn recent_addresses(&self, limit: usize) -> Result<Vec<AddressStats>, StoreError> {
        let sql = format!(
            "SELECT {} FROM address_subscriptions ORDER BY seq DESC LIMIT ?1",
            ADDRESS_COLUMNS
        );
        self.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([to_limit(limit)], row_to_address)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    async fn query_high_value(
        &self,
        threshold: u64,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.read(|conn| select_high_value(conn, threshold, limit))
    }

    async fn query_by_address(&self, address: &str) -> Result<Option<AddressStats>, StoreError> {
        let sql = format!("SELECT {} FROM address_subscriptions WHERE address = ?1", ADDRESS_COLUMNS);
        self.read(|conn| Ok(conn.query_row(&sql, [address], row_to_address).optional()?))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("SELECT {} FROM transactions WHERE hash = ?1", TX_COLUMNS);
        let found = self.read(|conn| select_transactions(conn, &sql, params![hash]))?;
        Ok(found.into_iter().next())
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Block>, StoreError> {
        let sql = format!("SELECT {} FROM blocks WHERE hash = ?1", BLOCK_COLUMNS);
        self.read(|conn| Ok(conn.query_row(&sql, [hash], row_to_block).optional()?))
    }

    async fn count(&self, kind: RecordKind) -> Result<u64, StoreError> {
        let table = match kind {
            RecordKind::Transaction => "transactions",
            RecordKind::Block => "blocks",
            RecordKind::Address => "address_subscriptions",
        };
        self.read(|conn| Ok(to_u64(count_rows(conn, table)?)))
    }

    async fn aggregate_seed(&self, high_value_threshold: u64) -> Result<AggregateSeed, StoreError> {
        self.read(|conn| Self::read_seed(conn, high_value_threshold))
    }
}

fn insert_children(conn: &Connection, record: &Transaction) -> Result<(), StoreError> {
    let mut input_stmt = conn.prepare_cached(
        r#"
        INSERT INTO transaction_inputs (tx_hash, position, sequence, value, address, prev_tx_index, script)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )?;
    for input in &record.inputs {
        input_stmt.execute(params![
            record.hash,
            input.position,
            to_i64(input.sequence),
            input.value.map(to_i64),
            input.address,
            input.prev_tx_index,
            input.script,
        ])?;
    }

    let mut output_stmt = conn.prepare_cached(
        r#"
        INSERT INTO transaction_outputs (tx_hash, position, value, address, spent, script)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )?;
    for output in &record.outputs {
        output_stmt.execute(params![
            record.hash,
            output.position,
            to_i64(output.value),
            output.address,
            output.spent,
            output.script,
        ])?;
    }

    Ok(())
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Delete the oldest rows of `table` beyond `cap`. Returns how many went.
fn evict_oldest(conn: &Connection, table: &str, cap: usize) -> Result<usize, StoreError> {
    let excess = count_rows(conn, table)? - to_limit(cap);
    if excess <= 0 {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM {table} WHERE seq IN (SELECT seq FROM {table} ORDER BY seq ASC LIMIT ?1)",
        table = table
    );
    Ok(conn.execute(&sql, [excess])?)
}

/// `evict_oldest`, handing back what each deleted row contributed.
/// Transaction children go with the parent through ON DELETE CASCADE.
fn evict_with_footprints(
    conn: &Connection,
    table: &str,
    footprint: &str,
    cap: usize,
) -> Result<Vec<RecordFootprint>, StoreError> {
    let excess = count_rows(conn, table)? - to_limit(cap);
    if excess <= 0 {
        return Ok(Vec::new());
    }
    let sql = format!(
        "DELETE FROM {table} WHERE seq IN (SELECT seq FROM {table} ORDER BY seq ASC LIMIT ?1) RETURNING {footprint}",
        table = table,
        footprint = footprint
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([excess], row_to_footprint)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn select_minute_counts(conn: &Connection, sql: &str, param: i64) -> Result<Vec<(i64, u64)>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([param], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    Ok(rows
        .map(|r| r.map(|(minute, count)| (minute, to_u64(count))))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Evicted addresses also drop their ledger rows
fn evict_addresses(conn: &Connection, cap: usize) -> Result<usize, StoreError> {
    let excess = count_rows(conn, "address_subscriptions")? - to_limit(cap);
    if excess <= 0 {
        return Ok(0);
    }
    let evicted: Vec<String> = {
        let mut stmt = conn.prepare(
            r#"
            DELETE FROM address_subscriptions
            WHERE seq IN (SELECT seq FROM address_subscriptions ORDER BY seq ASC LIMIT ?1)
            RETURNING address
            "#,
        )?;
        let rows = stmt.query_map([excess], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    for address in &evicted {
        conn.execute("DELETE FROM address_activity WHERE address = ?1", [address])?;
        log::debug!("🗑️  Evicted address {}", address);
    }
    Ok(evicted.len())
}

fn select_transactions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Transaction>, StoreError> {
    let mut transactions = {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_transaction)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    for tx in &mut transactions {
        load_children(conn, tx)?;
    }
    Ok(transactions)
}

fn select_high_value(conn: &Connection, threshold: u64, limit: usize) -> Result<Vec<Transaction>, StoreError> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE total_output_value > ?1 ORDER BY seq DESC LIMIT ?2",
        TX_COLUMNS
    );
    select_transactions(conn, &sql, params![to_i64(threshold), to_limit(limit)])
}

fn select_recent_blocks(conn: &Connection, limit: usize) -> Result<Vec<Block>, StoreError> {
    let sql = format!("SELECT {} FROM blocks ORDER BY seq DESC LIMIT ?1", BLOCK_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([to_limit(limit)], row_to_block)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn load_children(conn: &Connection, tx: &mut Transaction) -> Result<(), StoreError> {
    let mut input_stmt = conn.prepare_cached(
        r#"
        SELECT position, sequence, value, address, prev_tx_index, script
        FROM transaction_inputs WHERE tx_hash = ?1 ORDER BY position
        "#,
    )?;
    let inputs = input_stmt.query_map([&tx.hash], |row| {
        Ok(TransactionInput {
            position: row.get(0)?,
            sequence: to_u64(row.get(1)?),
            value: row.get::<_, Option<i64>>(2)?.map(to_u64),
            address: row.get(3)?,
            prev_tx_index: row.get(4)?,
            script: row.get(5)?,
        })
    })?;
    tx.inputs = inputs.collect::<Result<Vec<_>, _>>()?;

    let mut output_stmt = conn.prepare_cached(
        r#"
        SELECT position, value, address, spent, script
        FROM transaction_outputs WHERE tx_hash = ?1 ORDER BY position
        "#,
    )?;
    let outputs = output_stmt.query_map([&tx.hash], |row| {
        Ok(TransactionOutput {
            position: row.get(0)?,
            value: to_u64(row.get(1)?),
            address: row.get(2)?,
            spent: row.get(3)?,
            script: row.get(4)?,
        })
    })?;
    tx.outputs = outputs.collect::<Result<Vec<_>, _>>()?;

    Ok(())
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        hash: row.get(0)?,
        tx_index: row.get(1)?,
        time: row.get(2)?,
        size: row.get(3)?,
        version: row.get(4)?,
        lock_time: row.get(5)?,
        relayed_by: row.get(6)?,
        inputs: Vec::new(),
        outputs: Vec::new(),
        total_input_value: row.get::<_, Option<i64>>(7)?.map(to_u64),
        total_output_value: to_u64(row.get(8)?),
        fee: row.get::<_, Option<i64>>(9)?.map(to_u64),
        is_high_value: row.get(10)?,
    })
}

fn row_to_block(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        hash: row.get(0)?,
        height: to_u64(row.get(1)?),
        time: row.get(2)?,
        size: to_u64(row.get(3)?),
        n_tx: to_u64(row.get(4)?),
        merkle_root: row.get(5)?,
        nonce: to_u64(row.get(6)?),
        bits: to_u64(row.get(7)?),
        version: row.get(8)?,
        block_index: row.get(9)?,
        prev_block_index: row.get(10)?,
        prev_block_hash: row.get(11)?,
        total_btc_sent: row.get::<_, Option<i64>>(12)?.map(to_u64),
        estimated_btc_sent: row.get::<_, Option<i64>>(13)?.map(to_u64),
        reward: row.get::<_, Option<i64>>(14)?.map(to_u64),
    })
}

fn row_to_footprint(row: &Row<'_>) -> rusqlite::Result<RecordFootprint> {
    Ok(RecordFootprint {
        time: row.get(0)?,
        stored_at: row.get(1)?,
        fee: row.get::<_, Option<i64>>(2)?.map(to_u64),
        value: to_u64(row.get(3)?),
    })
}

fn row_to_address(row: &Row<'_>) -> rusqlite::Result<AddressStats> {
    Ok(AddressStats {
        address: row.get(0)?,
        subscribed_at: row.get(1)?,
        transaction_count: to_u64(row.get(2)?),
        total_received: to_u64(row.get(3)?),
        total_sent: to_u64(row.get(4)?),
        last_activity: row.get(5)?,
    })
}

// SQLite integers are signed; satoshi amounts never get near i64::MAX
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(policy: DuplicatePolicy, max_transactions: usize) -> (TempDir, SqliteRetentionStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = RetentionConfig {
            db_path: dir.path().join("retention.db").to_str().unwrap().to_string(),
            max_transactions,
            max_blocks: 3,
            max_addresses: 2,
            duplicate_policy: policy,
        };
        let store = SqliteRetentionStore::open(&config).unwrap();
        (dir, store)
    }

    fn tx(hash: &str, time: i64, output_value: u64, fee: Option<u64>) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            tx_index: None,
            time,
            size: 200,
            version: 1,
            lock_time: 0,
            relayed_by: None,
            inputs: vec![TransactionInput {
                position: 0,
                sequence: 0xffff_ffff,
                value: fee.map(|f| output_value + f),
                address: Some("1sender".to_string()),
                prev_tx_index: Some(7),
                script: "47".to_string(),
            }],
            outputs: vec![TransactionOutput {
                position: 0,
                value: output_value,
                address: Some("1receiver".to_string()),
                spent: false,
                script: "76a9".to_string(),
            }],
            total_input_value: fee.map(|f| output_value + f),
            total_output_value: output_value,
            fee,
            is_high_value: false,
        }
    }

    fn block(hash: &str, height: u64) -> Block {
        Block {
            hash: hash.to_string(),
            height,
            time: 1_700_000_000 + height as i64,
            size: 1_000,
            n_tx: 10,
            merkle_root: "root".to_string(),
            nonce: 1,
            bits: 2,
            version: 3,
            block_index: None,
            prev_block_index: None,
            prev_block_hash: Some(format!("prev_{}", hash)),
            total_btc_sent: None,
            estimated_btc_sent: None,
            reward: Some(625_000_000),
        }
    }

    #[tokio::test]
    async fn test_duplicate_ignored_keeps_first_copy() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 10);

        let first = store.upsert_transaction(&tx("dup", 100, 5_000, Some(10))).await.unwrap();
        assert_eq!(first.outcome, UpsertOutcome::Inserted);

        let second = store.upsert_transaction(&tx("dup", 200, 9_000, Some(20))).await.unwrap();
        assert_eq!(second.outcome, UpsertOutcome::Ignored);

        assert_eq!(store.count(RecordKind::Transaction).await.unwrap(), 1);
        let stored = store.get_transaction("dup").await.unwrap().unwrap();
        assert_eq!(stored.total_output_value, 5_000);
        assert_eq!(stored.inputs.len(), 1);
        assert_eq!(stored.outputs[0].address.as_deref(), Some("1receiver"));
    }

    #[tokio::test]
    async fn test_duplicate_overwrite_replaces_in_place() {
        let (_dir, store) = open_store(DuplicatePolicy::Overwrite, 2);

        store.upsert_transaction(&tx("a", 100, 5_000, Some(10))).await.unwrap();
        store.upsert_transaction(&tx("b", 101, 5_000, Some(10))).await.unwrap();

        let report = store.upsert_transaction(&tx("a", 100, 7_000, None)).await.unwrap();
        assert_eq!(report.outcome, UpsertOutcome::Replaced);
        let previous = report.replaced.unwrap();
        assert_eq!((previous.time, previous.fee, previous.value), (100, Some(10), 5_000));
        assert_eq!(report.stored.unwrap().value, 7_000);
        assert_eq!(store.count(RecordKind::Transaction).await.unwrap(), 2);

        let stored = store.get_transaction("a").await.unwrap().unwrap();
        assert_eq!(stored.total_output_value, 7_000);
        assert_eq!(stored.fee, None);
        assert_eq!(stored.outputs.len(), 1);

        // "a" kept its original position, so it is still the oldest
        let report = store.upsert_transaction(&tx("c", 102, 5_000, Some(1))).await.unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!((report.removed[0].time, report.removed[0].fee), (100, None));
        assert!(store.get_transaction("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 5);

        for i in 0..12 {
            let report = store
                .upsert_transaction(&tx(&format!("tx_{:02}", i), 100 + i, 1_000, Some(i as u64)))
                .await
                .unwrap();
            assert_eq!(report.evicted, if i >= 5 { 1 } else { 0 });
            assert!(store.count(RecordKind::Transaction).await.unwrap() <= 5);
        }

        let recent = store.recent_transactions(100).await.unwrap();
        let hashes: Vec<&str> = recent.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["tx_11", "tx_10", "tx_09", "tx_08", "tx_07"]);

        // Children of evicted rows are gone too
        let conn = store.reader().unwrap();
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM transaction_inputs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 5);
    }

    #[tokio::test]
    async fn test_block_cap_and_lookup() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 10);

        for height in 1..=5 {
            store.upsert_block(&block(&format!("b{}", height), height)).await.unwrap();
        }
        let again = store.upsert_block(&block("b5", 5)).await.unwrap();
        assert_eq!(again.outcome, UpsertOutcome::Ignored);

        assert_eq!(store.count(RecordKind::Block).await.unwrap(), 3);
        assert!(store.get_block("b2").await.unwrap().is_none());

        let b5 = store.get_block("b5").await.unwrap().unwrap();
        assert_eq!(b5.prev_block_hash.as_deref(), Some("prev_b5"));
        assert_eq!(b5.reward, Some(625_000_000));

        let heights: Vec<u64> = store.recent_blocks(10).await.unwrap().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_block_overwrite_replaces_in_place() {
        let (_dir, store) = open_store(DuplicatePolicy::Overwrite, 10);

        for height in 1..=3 {
            store.upsert_block(&block(&format!("b{}", height), height)).await.unwrap();
        }

        let mut revised = block("b1", 1);
        revised.n_tx = 99;
        revised.reward = None;
        let report = store.upsert_block(&revised).await.unwrap();
        assert_eq!(report.outcome, UpsertOutcome::Replaced);
        assert_eq!(report.evicted, 0);
        assert_eq!(report.replaced.unwrap().time, 1_700_000_001);
        assert_eq!(store.count(RecordKind::Block).await.unwrap(), 3);

        let stored = store.get_block("b1").await.unwrap().unwrap();
        assert_eq!(stored.n_tx, 99);
        assert_eq!(stored.reward, None);

        // b1 kept its original position, so it is the first to go
        let report = store.upsert_block(&block("b4", 4)).await.unwrap();
        assert_eq!(report.outcome, UpsertOutcome::Inserted);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].time, 1_700_000_001);
        assert!(store.get_block("b1").await.unwrap().is_none());
        assert!(store.get_block("b2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_future_timestamps_capped_in_window() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 100);
        let now = chrono::Utc::now().timestamp();

        let skewed = store.upsert_transaction(&tx("future", now + 86_400, 1_000, Some(1))).await.unwrap();
        let written = skewed.stored.unwrap();
        assert_eq!(written.time, now + 86_400);
        assert!(written.window_time() <= written.stored_at + MAX_FUTURE_SKEW_SECS);

        for i in 0..5 {
            store.upsert_transaction(&tx(&format!("real_{}", i), now, 1_000, Some(1))).await.unwrap();
        }

        let seed = store.aggregate_seed(100_000_000).await.unwrap();
        let windowed: u64 = seed.minute_counts.iter().map(|(_, count)| count).sum();
        assert_eq!(windowed, 6);
        let newest_minute = seed.minute_counts.last().unwrap().0;
        assert!(newest_minute <= (now + MAX_FUTURE_SKEW_SECS + 60) / 60);

        let stored: u64 = seed.stored_minute_counts.iter().map(|(_, count)| count).sum();
        assert_eq!(stored, 6);
        assert_eq!(seed.total_volume, 6_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_partial_state() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 20);
        let store = Arc::new(store);
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let writer = {
            let store = store.clone();
            let done = done.clone();
            tokio::spawn(async move {
                for i in 0..400 {
                    store
                        .upsert_transaction(&tx(&format!("tx_{:03}", i), 100 + i, 1_000, Some(5)))
                        .await
                        .unwrap();
                    if i % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                done.store(true, std::sync::atomic::Ordering::SeqCst);
            })
        };

        let mut readers = Vec::new();
        for r in 0..3u64 {
            let store = store.clone();
            let done = done.clone();
            readers.push(tokio::spawn(async move {
                let mut checks = 0u64;
                while !done.load(std::sync::atomic::Ordering::SeqCst) || checks < 50 {
                    assert!(store.count(RecordKind::Transaction).await.unwrap() <= 20);

                    let recent = store.recent_transactions(20).await.unwrap();
                    assert!(recent.len() <= 20);
                    for stored in &recent {
                        assert_eq!(stored.inputs.len(), 1, "inputs of {} torn", stored.hash);
                        assert_eq!(stored.outputs.len(), 1, "outputs of {} torn", stored.hash);
                    }

                    if let Some(newest) = recent.first() {
                        if let Some(found) = store.get_transaction(&newest.hash).await.unwrap() {
                            assert_eq!(found.inputs.len(), 1);
                            assert_eq!(found.outputs.len(), 1);
                        }
                    }

                    checks += 1;
                    if checks % (4 + r) == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.count(RecordKind::Transaction).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_high_value_boundary() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 10);
        let threshold = 100_000_000;

        store.upsert_transaction(&tx("at", 1, threshold, Some(1))).await.unwrap();
        store.upsert_transaction(&tx("above", 2, threshold + 1, Some(1))).await.unwrap();
        store.upsert_transaction(&tx("below", 3, threshold - 1, Some(1))).await.unwrap();

        let high = store.query_high_value(threshold, 10).await.unwrap();
        let hashes: Vec<&str> = high.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["above"]);
    }

    #[tokio::test]
    async fn test_address_activity_counted_once() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 10);
        store.register_address("1watched", 1_000).await.unwrap();

        let activity = AddressActivity {
            address: "1watched".to_string(),
            tx_hash: "t1".to_string(),
            received: 5_000,
            sent: 1_000,
            time: 2_000,
        };
        assert!(store.upsert_address_activity(&activity).await.unwrap().is_new());
        assert_eq!(
            store.upsert_address_activity(&activity).await.unwrap().outcome,
            UpsertOutcome::Ignored
        );

        let mut second = activity.clone();
        second.tx_hash = "t2".to_string();
        second.time = 1_500;
        store.upsert_address_activity(&second).await.unwrap();

        let stats = store.query_by_address("1watched").await.unwrap().unwrap();
        assert_eq!(stats.subscribed_at, Some(1_000));
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.total_received, 10_000);
        assert_eq!(stats.total_sent, 2_000);
        // An out-of-order event does not move last_activity backwards
        assert_eq!(stats.last_activity, Some(2_000));

        // Re-registering keeps the first timestamp
        store.register_address("1watched", 9_999).await.unwrap();
        let stats = store.query_by_address("1watched").await.unwrap().unwrap();
        assert_eq!(stats.subscribed_at, Some(1_000));
    }

    #[tokio::test]
    async fn test_address_cap() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 10);
        for (i, address) in ["1a", "1b", "1c"].iter().enumerate() {
            store.register_address(address, i as i64).await.unwrap();
        }
        assert_eq!(store.count(RecordKind::Address).await.unwrap(), 2);
        assert!(store.query_by_address("1a").await.unwrap().is_none());

        let recent = store.query_recent(RecordKind::Address, 10).await.unwrap();
        assert!(matches!(&recent[0], StoredRecord::Address(a) if a.address == "1c"));
    }

    #[tokio::test]
    async fn test_aggregate_seed() {
        let (_dir, store) = open_store(DuplicatePolicy::Ignore, 10);

        store.upsert_transaction(&tx("t1", 60 * 100, 1_000, Some(100))).await.unwrap();
        store.upsert_transaction(&tx("t2", 60 * 100 + 30, 200_000_000, Some(300))).await.unwrap();
        store.upsert_transaction(&tx("t3", 60 * 101, 1_000, None)).await.unwrap();
        store.upsert_block(&block("b1", 820_000)).await.unwrap();

        let seed = store.aggregate_seed(100_000_000).await.unwrap();
        assert_eq!(seed.transaction_count, 3);
        assert_eq!(seed.block_count, 1);
        assert_eq!(seed.fee_sum, 400);
        assert_eq!(seed.fee_count, 2);
        assert_eq!(seed.total_volume, 200_002_000);
        assert_eq!(seed.latest_block_height, Some(820_000));
        assert_eq!(seed.minute_counts, vec![(100, 2), (101, 1)]);
        assert_eq!(seed.recent_high_value.len(), 1);
        assert_eq!(seed.recent_blocks[0].hash, "b1");
    }

    #[tokio::test]
    async fn test_in_memory_store_reads_through_writer() {
        let config = RetentionConfig {
            db_path: ":memory:".to_string(),
            ..RetentionConfig::default()
        };
        let store = SqliteRetentionStore::open(&config).unwrap();
        store.upsert_block(&block("mem", 1)).await.unwrap();
        assert_eq!(store.count(RecordKind::Block).await.unwrap(), 1);
    }
}
