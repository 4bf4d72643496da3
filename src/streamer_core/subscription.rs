//! Outbound subscription directives and the set the client replays on every
//! (re)connect.

use crate::config::FeedConfig;
use serde::Serialize;

/// One outbound control frame, serialized as `{"op": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op")]
pub enum Directive {
    #[serde(rename = "unconfirmed_sub")]
    UnconfirmedSub,
    #[serde(rename = "blocks_sub")]
    BlocksSub,
    #[serde(rename = "addr_sub")]
    AddrSub { addr: String },
    #[serde(rename = "addr_unsub")]
    AddrUnsub { addr: String },
    #[serde(rename = "ping")]
    Ping,
}

impl Directive {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Streams requested for a session. Address order is preserved and
/// duplicates are dropped, so a replay sends each directive exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    pub unconfirmed: bool,
    pub blocks: bool,
    addresses: Vec<String>,
}

impl SubscriptionSet {
    pub fn new(unconfirmed: bool, blocks: bool) -> Self {
        Self {
            unconfirmed,
            blocks,
            addresses: Vec::new(),
        }
    }

    pub fn from_config(config: &FeedConfig, addresses: &[String]) -> Self {
        let mut set = Self::new(config.subscribe_unconfirmed, config.subscribe_blocks);
        for address in addresses {
            set.add_address(address);
        }
        set
    }

    /// Returns false if the address was already present
    pub fn add_address(&mut self, address: &str) -> bool {
        if self.addresses.iter().any(|a| a == address) {
            return false;
        }
        self.addresses.push(address.to_string());
        true
    }

    /// Returns false if the address was not present
    pub fn remove_address(&mut self, address: &str) -> bool {
        let before = self.addresses.len();
        self.addresses.retain(|a| a != address);
        self.addresses.len() != before
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Directives for a fresh session, streams first, then addresses
    pub fn directives(&self) -> Vec<Directive> {
        let mut directives = Vec::with_capacity(2 + self.addresses.len());
        if self.unconfirmed {
            directives.push(Directive::UnconfirmedSub);
        }
        if self.blocks {
            directives.push(Directive::BlocksSub);
        }
        directives.extend(
            self.addresses
                .iter()
                .map(|addr| Directive::AddrSub { addr: addr.clone() }),
        );
        directives
    }
}
