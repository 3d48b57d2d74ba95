pub mod memory;


use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Result;
use crate::models::Transaction;

pub use memory::InMemoryStore;

/// What happens to an address's indexed history when it unsubscribes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnsubscribePolicy {
    /// Drop the history; a later re-subscribe starts empty.
    #[default]
    Purge,
    /// Keep the history hidden until the address subscribes again.
    Retain,
}

impl FromStr for UnsubscribePolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "purge" => Ok(UnsubscribePolicy::Purge),
            "retain" => Ok(UnsubscribePolicy::Retain),
            other => Err(format!("unknown unsubscribe policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub subscriptions: usize,
    pub indexed_transactions: usize,
    pub watermark: Option<u64>,
}

/// Subscriptions, the processing watermark and the indexed transactions.
///
/// Every operation is safe to call concurrently. Addresses are compared
/// case-insensitively.
pub trait Storage: Send + Sync {
    /// Returns `true` if the address was not subscribed before.
    fn add_subscription(&self, address: &str) -> bool;

    /// Returns `true` if the address was subscribed before.
    fn remove_subscription(&self, address: &str) -> bool;

    fn is_subscribed(&self, address: &str) -> bool;

    /// Highest fully processed block height, `None` until a starting point exists.
    fn get_watermark(&self) -> Option<u64>;

    /// Fails with `InvariantViolation` if `height` is below the current watermark.
    fn set_watermark(&self, height: u64) -> Result<()>;

    /// Index a transaction under its hash and both participants.
    /// Returns `false` if the hash was already indexed.
    fn record_transaction(&self, tx: &Transaction) -> bool;

    /// Record the matched transactions of block `height` and advance the
    /// watermark to it in one step. Returns how many were newly recorded.
    fn commit_block(&self, height: u64, transactions: &[Transaction]) -> Result<usize>;

    /// Insertion-ordered history; empty when the address is not subscribed.
    fn get_transactions_for(&self, address: &str) -> Vec<Transaction>;

    fn get_transaction_by_hash(&self, hash: &str) -> Option<Transaction>;

    fn stats(&self) -> StoreStats;
}

/// Canonical form used for subscription and index keys.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim().to_lowercase();
    if trimmed.starts_with("0x") {
        trimmed
    } else {
        format!("0x{}", trimmed)
    }
}
