//! Domain records produced by the classifier and kept by the store
//!
//! Values are in satoshis throughout. Times are feed event times (unix
//! seconds), never ingestion wall-clock.

use crate::config::SATS_PER_BTC;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub position: u32,
    pub sequence: u64,
    /// Value of the spent output; `None` when the feed could not resolve it
    pub value: Option<u64>,
    pub address: Option<String>,
    pub prev_tx_index: Option<i64>,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub position: u32,
    pub value: u64,
    /// Absent for scripts the feed could not turn into an address
    pub address: Option<String>,
    pub spent: bool,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub tx_index: Option<i64>,
    pub time: i64,
    pub size: u32,
    pub version: i32,
    pub lock_time: u32,
    pub relayed_by: Option<String>,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    /// `None` if any input value is unknown
    pub total_input_value: Option<u64>,
    pub total_output_value: u64,
    /// `None` = unknown. Never negative.
    pub fee: Option<u64>,
    pub is_high_value: bool,
}

impl Transaction {
    pub fn output_btc(&self) -> f64 {
        sats_to_btc(self.total_output_value)
    }

    /// Sum of outputs paying `address`
    pub fn received_by(&self, address: &str) -> u64 {
        self.outputs
            .iter()
            .filter(|out| out.address.as_deref() == Some(address))
            .fold(0u64, |acc, out| acc.saturating_add(out.value))
    }

    /// Sum of known input values spent from `address`
    pub fn sent_by(&self, address: &str) -> u64 {
        self.inputs
            .iter()
            .filter(|inp| inp.address.as_deref() == Some(address))
            .filter_map(|inp| inp.value)
            .fold(0u64, u64::saturating_add)
    }

    pub fn touches(&self, address: &str) -> bool {
        self.outputs.iter().any(|out| out.address.as_deref() == Some(address))
            || self.inputs.iter().any(|inp| inp.address.as_deref() == Some(address))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    /// Not unique: a reorg can report the same height twice
    pub height: u64,
    pub time: i64,
    pub size: u64,
    pub n_tx: u64,
    pub merkle_root: String,
    pub nonce: u64,
    pub bits: u64,
    pub version: i64,
    pub block_index: Option<i64>,
    pub prev_block_index: Option<i64>,
    /// Lookup key for the parent; the store does not validate the chain
    pub prev_block_hash: Option<String>,
    pub total_btc_sent: Option<u64>,
    pub estimated_btc_sent: Option<u64>,
    pub reward: Option<u64>,
}

/// One transaction touching one watched address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressActivity {
    pub address: String,
    pub tx_hash: String,
    pub received: u64,
    pub sent: u64,
    pub time: i64,
}

/// Accumulated per-address counters, the only record mutated in place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    pub address: String,
    pub subscribed_at: Option<i64>,
    pub transaction_count: u64,
    pub total_received: u64,
    pub total_sent: u64,
    pub last_activity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Transaction(Transaction),
    Block(Block),
    AddressActivity(AddressActivity),
}

impl DomainEvent {
    pub fn kind(&self) -> RecordKind {
        match self {
            DomainEvent::Transaction(_) => RecordKind::Transaction,
            DomainEvent::Block(_) => RecordKind::Block,
            DomainEvent::AddressActivity(_) => RecordKind::Address,
        }
    }

    /// Event time carried by the feed
    pub fn time(&self) -> i64 {
        match self {
            DomainEvent::Transaction(tx) => tx.time,
            DomainEvent::Block(block) => block.time,
            DomainEvent::AddressActivity(activity) => activity.time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Transaction,
    Block,
    Address,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Transaction => "transaction",
            RecordKind::Block => "block",
            RecordKind::Address => "address",
        }
    }
}

pub fn sats_to_btc(sats: u64) -> f64 {
    sats as f64 / SATS_PER_BTC as f64
}
