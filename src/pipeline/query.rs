//! Read-only facade for dashboard collaborators
//!
//! Everything here goes through the store's reader side or the published
//! statistics snapshot; nothing can mutate ingestion state.

use super::db::{RecordStore, StoreError, StoredRecord};
use super::stats::{StatsReader, StatsSnapshot};
use super::types::{AddressStats, Block, RecordKind, Transaction};
use serde::Serialize;
use std::sync::Arc;

/// Upper bound on rows returned by one listing call
pub const MAX_PAGE: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub stats: StatsSnapshot,
    pub recent_transactions: Vec<Transaction>,
    pub recent_blocks: Vec<Block>,
    pub addresses: Vec<AddressStats>,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn RecordStore>,
    stats: StatsReader,
    high_value_threshold: u64,
}

impl QueryService {
    pub fn new(store: Arc<dyn RecordStore>, stats: StatsReader, high_value_threshold: u64) -> Self {
        Self {
            store,
            stats,
            high_value_threshold,
        }
    }

    pub fn stats(&self) -> Arc<StatsSnapshot> {
        self.stats.latest()
    }

    pub async fn recent(&self, kind: RecordKind, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
        self.store.query_recent(kind, limit.min(MAX_PAGE)).await
    }

    pub async fn high_value(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        self.store
            .query_high_value(self.high_value_threshold, limit.min(MAX_PAGE))
            .await
    }

    pub async fn address(&self, address: &str) -> Result<Option<AddressStats>, StoreError> {
        self.store.query_by_address(address).await
    }

    pub async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        self.store.get_transaction(hash).await
    }

    pub async fn block(&self, hash: &str) -> Result<Option<Block>, StoreError> {
        self.store.get_block(hash).await
    }

    /// The stored parent, if the block names one and it is still retained
    pub async fn parent_of(&self, block: &Block) -> Result<Option<Block>, StoreError> {
        match &block.prev_block_hash {
            Some(prev) => self.store.get_block(prev).await,
            None => Ok(None),
        }
    }

    /// One consistent-enough bundle for a dashboard refresh
    pub async fn dashboard(&self, limit: usize) -> Result<DashboardView, StoreError> {
        let limit = limit.min(MAX_PAGE);
        Ok(DashboardView {
            stats: self.stats().as_ref().clone(),
            recent_transactions: self.store.recent_transactions(limit).await?,
            recent_blocks: self.store.recent_blocks(limit).await?,
            addresses: self.store.recent_addresses(limit).await?,
        })
    }
}
