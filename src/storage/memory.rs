use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{IndexerError, Result};
use crate::models::Transaction;
use crate::storage::{normalize_address, Storage, StoreStats, UnsubscribePolicy};

/// Watermark and transaction indices. Kept behind one lock so a reader never
/// sees a certified height without its transactions, or the reverse.
#[derive(Default)]
struct TransactionIndex {
    watermark: Option<u64>,
    by_hash: HashMap<String, Arc<Transaction>>,
    by_address: HashMap<String, Vec<Arc<Transaction>>>,
}

impl TransactionIndex {
    fn insert(&mut self, tx: &Transaction) -> bool {
        if self.by_hash.contains_key(&tx.hash) {
            return false;
        }

        let tx = Arc::new(tx.clone());
        let from = normalize_address(&tx.from);
        let to = tx.to.as_deref().map(normalize_address);

        self.by_address
            .entry(from.clone())
            .or_default()
            .push(Arc::clone(&tx));

        if let Some(to) = to {
            if to != from {
                self.by_address.entry(to).or_default().push(Arc::clone(&tx));
            }
        }

        self.by_hash.insert(tx.hash.clone(), tx);
        true
    }

    fn check_watermark(&self, height: u64) -> Result<()> {
        match self.watermark {
            Some(current) if height < current => Err(IndexerError::InvariantViolation(format!(
                "watermark regression from {} to {}",
                current, height
            ))),
            _ => Ok(()),
        }
    }

    /// Drop an address's sequence. A transaction none of whose other
    /// participants is subscribed leaves the index entirely, counterparty
    /// sequences included. Returns how many transactions left the index.
    fn drop_history(&mut self, address: &str, subscriptions: &HashSet<String>) -> usize {
        let Some(history) = self.by_address.remove(address) else {
            return 0;
        };

        let mut removed = 0;
        for tx in history {
            let counterparties: Vec<String> = tx
                .participants()
                .map(normalize_address)
                .filter(|participant| participant != address)
                .collect();

            if counterparties.iter().any(|c| subscriptions.contains(c)) {
                continue;
            }

            for counterparty in &counterparties {
                if let Some(seq) = self.by_address.get_mut(counterparty) {
                    seq.retain(|other| !Arc::ptr_eq(other, &tx));
                    if seq.is_empty() {
                        self.by_address.remove(counterparty);
                    }
                }
            }

            if self.by_hash.remove(&tx.hash).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

/// Process-memory implementation of [`Storage`].
///
/// Lock order is subscriptions before index; no method takes them the other way round.
pub struct InMemoryStore {
    subscriptions: RwLock<HashSet<String>>,
    index: RwLock<TransactionIndex>,
    policy: UnsubscribePolicy,
}

impl InMemoryStore {
    pub fn new(policy: UnsubscribePolicy) -> Self {
        Self {
            subscriptions: RwLock::new(HashSet::new()),
            index: RwLock::new(TransactionIndex::default()),
            policy,
        }
    }

    pub fn policy(&self) -> UnsubscribePolicy {
        self.policy
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(UnsubscribePolicy::default())
    }
}

// Writers never leave the maps half-updated across a panic point, so a
// poisoned guard still holds consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Storage for InMemoryStore {
    fn add_subscription(&self, address: &str) -> bool {
        let address = normalize_address(address);
        let mut subscriptions = write(&self.subscriptions);
        let added = subscriptions.insert(address.clone());

        // Clean slate: anything indexed while the address was only a counterparty,
        // or committed after it unsubscribed, is not its history.
        if added && self.policy == UnsubscribePolicy::Purge {
            write(&self.index).drop_history(&address, &subscriptions);
        }
        added
    }

    fn remove_subscription(&self, address: &str) -> bool {
        let address = normalize_address(address);
        let mut subscriptions = write(&self.subscriptions);
        let removed = subscriptions.remove(&address);

        if removed && self.policy == UnsubscribePolicy::Purge {
            let purged = write(&self.index).drop_history(&address, &subscriptions);
            log::debug!("Purged {} transactions for unsubscribed address {}", purged, address);
        }
        removed
    }

    fn is_subscribed(&self, address: &str) -> bool {
        read(&self.subscriptions).contains(&normalize_address(address))
    }

    fn get_watermark(&self) -> Option<u64> {
        read(&self.index).watermark
    }

    fn set_watermark(&self, height: u64) -> Result<()> {
        let mut index = write(&self.index);
        index.check_watermark(height)?;
        index.watermark = Some(height);
        Ok(())
    }

    fn record_transaction(&self, tx: &Transaction) -> bool {
        write(&self.index).insert(tx)
    }

    fn commit_block(&self, height: u64, transactions: &[Transaction]) -> Result<usize> {
        let mut index = write(&self.index);
        index.check_watermark(height)?;
        let recorded = transactions.iter().filter(|tx| index.insert(tx)).count();
        index.watermark = Some(height);
        Ok(recorded)
    }

    fn get_transactions_for(&self, address: &str) -> Vec<Transaction> {
        let address = normalize_address(address);
        let subscriptions = read(&self.subscriptions);
        if !subscriptions.contains(&address) {
            return Vec::new();
        }

        read(&self.index)
            .by_address
            .get(&address)
            .map(|seq| seq.iter().map(|tx| Transaction::clone(tx)).collect())
            .unwrap_or_default()
    }

    fn get_transaction_by_hash(&self, hash: &str) -> Option<Transaction> {
        read(&self.index)
            .by_hash
            .get(hash)
            .map(|tx| Transaction::clone(tx))
    }

    fn stats(&self) -> StoreStats {
        let subscriptions = read(&self.subscriptions).len();
        let index = read(&self.index);
        StoreStats {
            subscriptions,
            indexed_transactions: index.by_hash.len(),
            watermark: index.watermark,
        }
    }
}
