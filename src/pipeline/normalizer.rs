//! Raw feed message → typed domain events
//!
//! The wire structs below are deliberately permissive: unknown fields are
//! ignored and optional fields default to `None`. Required fields are checked
//! by hand so the error names the missing field.

use crate::pipeline::types::{
    AddressActivity, Block, DomainEvent, Transaction, TransactionInput, TransactionOutput,
};
use crate::streamer_core::RawMessage;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationError {
    UnsupportedOp(String),
    MissingPayload(String),
    MissingField(&'static str),
    Malformed(String),
}

impl std::fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationError::UnsupportedOp(op) => write!(f, "Unsupported op: {}", op),
            ClassificationError::MissingPayload(op) => write!(f, "Message '{}' has no payload", op),
            ClassificationError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ClassificationError::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
        }
    }
}

impl std::error::Error for ClassificationError {}

impl From<serde_json::Error> for ClassificationError {
    fn from(err: serde_json::Error) -> Self {
        ClassificationError::Malformed(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    hash: Option<String>,
    tx_index: Option<i64>,
    time: Option<i64>,
    size: Option<u32>,
    ver: Option<i32>,
    lock_time: Option<u32>,
    relayed_by: Option<String>,
    inputs: Option<Vec<WireInput>>,
    out: Option<Vec<WireOutput>>,
}

#[derive(Debug, Deserialize)]
struct WireInput {
    sequence: Option<u64>,
    prev_out: Option<WirePrevOut>,
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePrevOut {
    value: Option<u64>,
    addr: Option<String>,
    tx_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireOutput {
    value: Option<u64>,
    addr: Option<String>,
    #[serde(default)]
    spent: bool,
    n: Option<u32>,
    script: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlock {
    hash: Option<String>,
    height: Option<u64>,
    time: Option<i64>,
    mrkl_root: Option<String>,
    n_tx: Option<u64>,
    size: Option<u64>,
    nonce: Option<u64>,
    bits: Option<u64>,
    version: Option<i64>,
    block_index: Option<i64>,
    prev_block_index: Option<i64>,
    #[serde(alias = "prev_block")]
    prev_block: Option<String>,
    #[serde(rename = "totalBTCSent")]
    total_btc_sent: Option<u64>,
    #[serde(rename = "estimatedBTCSent")]
    estimated_btc_sent: Option<u64>,
    reward: Option<u64>,
}

/// Stateless apart from the watched-address list and the high-value threshold
#[derive(Debug, Clone)]
pub struct Classifier {
    monitored: Vec<String>,
    high_value_threshold: u64,
}

impl Classifier {
    pub fn new(monitored: &[String], high_value_threshold: u64) -> Self {
        let mut classifier = Self {
            monitored: Vec::with_capacity(monitored.len()),
            high_value_threshold,
        };
        for address in monitored {
            classifier.monitor(address);
        }
        classifier
    }

    /// Returns false if the address was already watched
    pub fn monitor(&mut self, address: &str) -> bool {
        if self.monitored.iter().any(|a| a == address) {
            return false;
        }
        self.monitored.push(address.to_string());
        true
    }

    /// Returns false if the address was not watched
    pub fn unmonitor(&mut self, address: &str) -> bool {
        let before = self.monitored.len();
        self.monitored.retain(|a| a != address);
        self.monitored.len() != before
    }

    pub fn monitored(&self) -> &[String] {
        &self.monitored
    }

    pub fn high_value_threshold(&self) -> u64 {
        self.high_value_threshold
    }

    /// A `utx` yields the transaction followed by one activity per watched
    /// address it touches; a `block` yields exactly one event.
    pub fn classify(&self, message: &RawMessage) -> Result<Vec<DomainEvent>, ClassificationError> {
        match message.op.as_str() {
            "utx" => {
                let payload = self.payload(message)?;
                let tx = self.normalize_transaction(payload)?;
                let mut events = self.address_activity(&tx, message.addr.as_deref());
                events.insert(0, DomainEvent::Transaction(tx));
                Ok(events)
            }
            "block" => {
                let payload = self.payload(message)?;
                Ok(vec![DomainEvent::Block(normalize_block(payload)?)])
            }
            other => Err(ClassificationError::UnsupportedOp(other.to_string())),
        }
    }

    fn payload<'a>(&self, message: &'a RawMessage) -> Result<&'a serde_json::Value, ClassificationError> {
        match message.x.as_ref() {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(ClassificationError::MissingPayload(message.op.clone())),
        }
    }

    fn normalize_transaction(&self, payload: &serde_json::Value) -> Result<Transaction, ClassificationError> {
        let wire = WireTransaction::deserialize(payload)?;

        let hash = wire.hash.ok_or(ClassificationError::MissingField("hash"))?;
        let time = wire.time.ok_or(ClassificationError::MissingField("time"))?;
        let wire_inputs = wire.inputs.ok_or(ClassificationError::MissingField("inputs"))?;
        let wire_outputs = wire.out.ok_or(ClassificationError::MissingField("out"))?;

        let inputs: Vec<TransactionInput> = wire_inputs
            .into_iter()
            .enumerate()
            .map(|(position, input)| {
                let (value, address, prev_tx_index) = match input.prev_out {
                    Some(prev) => (prev.value, prev.addr, prev.tx_index),
                    None => (None, None, None),
                };
                TransactionInput {
                    position: position as u32,
                    sequence: input.sequence.unwrap_or(0),
                    value,
                    address,
                    prev_tx_index,
                    script: input.script.unwrap_or_default(),
                }
            })
            .collect();

        let outputs = wire_outputs
            .into_iter()
            .enumerate()
            .map(|(position, output)| {
                let value = output.value.ok_or(ClassificationError::MissingField("out.value"))?;
                Ok(TransactionOutput {
                    position: output.n.unwrap_or(position as u32),
                    value,
                    address: output.addr,
                    spent: output.spent,
                    script: output.script.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, ClassificationError>>()?;

        let total_output_value = checked_sum(outputs.iter().map(|out| out.value))?;

        // Unknown as soon as one spent output could not be resolved. A
        // transaction without inputs has nothing to resolve a fee from.
        let total_input_value = if inputs.is_empty() {
            None
        } else {
            match inputs.iter().map(|inp| inp.value).collect::<Option<Vec<u64>>>() {
                Some(values) => Some(checked_sum(values.into_iter())?),
                None => None,
            }
        };

        let fee = total_input_value.map(|total_in| {
            if total_in < total_output_value {
                log::warn!(
                    "⚠️  Negative fee on {} (inputs {} < outputs {}), clamping to 0",
                    hash,
                    total_in,
                    total_output_value
                );
                0
            } else {
                total_in - total_output_value
            }
        });

        Ok(Transaction {
            hash,
            tx_index: wire.tx_index,
            time,
            size: wire.size.unwrap_or(0),
            version: wire.ver.unwrap_or(1),
            lock_time: wire.lock_time.unwrap_or(0),
            relayed_by: wire.relayed_by.filter(|r| !r.is_empty()),
            inputs,
            outputs,
            total_input_value,
            total_output_value,
            fee,
            is_high_value: total_output_value > self.high_value_threshold,
        })
    }

    fn address_activity(&self, tx: &Transaction, message_addr: Option<&str>) -> Vec<DomainEvent> {
        let mut watched: Vec<&str> = self.monitored.iter().map(String::as_str).collect();
        if let Some(addr) = message_addr {
            if !watched.contains(&addr) {
                watched.push(addr);
            }
        }

        watched
            .into_iter()
            .filter(|address| tx.touches(address))
            .map(|address| {
                DomainEvent::AddressActivity(AddressActivity {
                    address: address.to_string(),
                    tx_hash: tx.hash.clone(),
                    received: tx.received_by(address),
                    sent: tx.sent_by(address),
                    time: tx.time,
                })
            })
            .collect()
    }
}

fn normalize_block(payload: &serde_json::Value) -> Result<Block, ClassificationError> {
    let wire = WireBlock::deserialize(payload)?;

    Ok(Block {
        hash: wire.hash.ok_or(ClassificationError::MissingField("hash"))?,
        height: wire.height.ok_or(ClassificationError::MissingField("height"))?,
        time: wire.time.ok_or(ClassificationError::MissingField("time"))?,
        merkle_root: wire.mrkl_root.ok_or(ClassificationError::MissingField("mrklRoot"))?,
        n_tx: wire.n_tx.unwrap_or(0),
        size: wire.size.unwrap_or(0),
        nonce: wire.nonce.unwrap_or(0),
        bits: wire.bits.unwrap_or(0),
        version: wire.version.unwrap_or(0),
        block_index: wire.block_index,
        prev_block_index: wire.prev_block_index,
        prev_block_hash: wire.prev_block.filter(|h| !h.is_empty()),
        total_btc_sent: wire.total_btc_sent,
        estimated_btc_sent: wire.estimated_btc_sent,
        reward: wire.reward,
    })
}

fn checked_sum(mut values: impl Iterator<Item = u64>) -> Result<u64, ClassificationError> {
    values.try_fold(0u64, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| ClassificationError::Malformed("value sum overflows u64".to_string()))
    })
}
