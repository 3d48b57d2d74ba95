use std::sync::Arc;

use crate::error::ValidationError;
use crate::logging::LogContext;
use crate::models::{EventKind, ObserverEvent, Transaction};
use crate::storage::{normalize_address, Storage};

/// Destination for subscription notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ObserverEvent);
}

/// Writes every event to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &ObserverEvent) {
        LogContext::new("transaction_filter", "notify")
            .with_address(&event.address)
            .with_transaction_hash(&event.transaction.hash)
            .with_block_number(event.transaction.block_number)
            .with_metadata("event_type", serde_json::json!(event.kind.as_str()))
            .info(&format!(
                "New {} event in block {} for subscriber {}",
                event.kind.as_str(),
                event.transaction.block_number,
                event.address
            ));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    Drop,
}

/// Decides per transaction whether a subscribed address takes part in it.
pub struct TransactionFilter {
    store: Arc<dyn Storage>,
    sink: Arc<dyn EventSink>,
}

impl TransactionFilter {
    pub fn new(store: Arc<dyn Storage>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    pub fn with_log_sink(store: Arc<dyn Storage>) -> Self {
        Self::new(store, Arc::new(LogEventSink))
    }

    /// Emit a sent/received event for each subscribed side and report whether
    /// the transaction should be indexed. Nothing is written to the store here.
    pub fn evaluate(&self, tx: &Transaction) -> FilterDecision {
        let mut decision = FilterDecision::Drop;

        if self.store.is_subscribed(&tx.from) {
            self.notify(EventKind::TransactionSent, &tx.from, tx);
            decision = FilterDecision::Keep;
        }

        if let Some(to) = tx.to.as_deref() {
            if self.store.is_subscribed(to) {
                self.notify(EventKind::TransactionReceived, to, tx);
                decision = FilterDecision::Keep;
            }
        }

        decision
    }

    /// The subset of `transactions` worth indexing, in source order.
    pub fn select(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        transactions
            .iter()
            .filter(|tx| self.evaluate(tx) == FilterDecision::Keep)
            .cloned()
            .collect()
    }

    fn notify(&self, kind: EventKind, address: &str, tx: &Transaction) {
        self.sink.emit(&ObserverEvent {
            kind,
            address: normalize_address(address),
            transaction: tx.clone(),
        });
    }
}

/// Check that an address is `0x` followed by 40 hex digits.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let normalized = normalize_address(address);
    let digits = &normalized[2..];

    if digits.len() != 40 {
        return Err(ValidationError::InvalidAddress(format!(
            "address must be 40 hex characters long, got {}",
            digits.len()
        )));
    }

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAddress(
            "address contains non-hexadecimal characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::sync::Mutex;

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<ObserverEvent>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: &ObserverEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn setup(subscribed: &[&str]) -> (Arc<InMemoryStore>, Arc<CollectingSink>, TransactionFilter) {
        let store = Arc::new(InMemoryStore::default());
        for address in subscribed {
            store.add_subscription(address);
        }
        let sink = Arc::new(CollectingSink::default());
        let filter = TransactionFilter::new(store.clone(), sink.clone());
        (store, sink, filter)
    }

    fn tx(hash: &str, from: &str, to: Option<&str>) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            block_number: 42,
            from: from.to_string(),
            to: to.map(str::to_string),
            value: "0x0".to_string(),
        }
    }

    #[test]
    fn test_sender_subscribed_emits_sent_event() {
        let (_, sink, filter) = setup(&[ALICE]);

        assert_eq!(filter.evaluate(&tx("0x1", ALICE, Some(BOB))), FilterDecision::Keep);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::TransactionSent);
        assert_eq!(events[0].address, ALICE);
    }

    #[test]
    fn test_receiver_subscribed_emits_received_event() {
        let (_, sink, filter) = setup(&[BOB]);

        assert_eq!(filter.evaluate(&tx("0x1", ALICE, Some(BOB))), FilterDecision::Keep);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::TransactionReceived);
        assert_eq!(events[0].address, BOB);
    }

    #[test]
    fn test_both_sides_subscribed_emit_two_events() {
        let (_, sink, filter) = setup(&[ALICE, BOB]);

        assert_eq!(filter.evaluate(&tx("0x1", ALICE, Some(BOB))), FilterDecision::Keep);

        let kinds: Vec<_> = sink.events.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::TransactionSent, EventKind::TransactionReceived]);
    }

    #[test]
    fn test_unrelated_transaction_is_dropped_silently() {
        let (store, sink, filter) = setup(&[ALICE]);

        assert_eq!(filter.evaluate(&tx("0x1", BOB, Some(CAROL))), FilterDecision::Drop);
        assert!(sink.events.lock().unwrap().is_empty());
        assert!(store.get_transaction_by_hash("0x1").is_none());
    }

    #[test]
    fn test_contract_creation_matches_on_sender_only() {
        let (_, sink, filter) = setup(&[ALICE]);

        assert_eq!(filter.evaluate(&tx("0x1", ALICE, None)), FilterDecision::Keep);
        assert_eq!(filter.evaluate(&tx("0x2", BOB, None)), FilterDecision::Drop);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let (_, _, filter) = setup(&[ALICE]);
        let upper = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

        assert_eq!(filter.evaluate(&tx("0x1", BOB, Some(upper))), FilterDecision::Keep);
    }

    #[test]
    fn test_select_keeps_source_order() {
        let (_, _, filter) = setup(&[ALICE]);
        let block = vec![
            tx("0x1", ALICE, Some(BOB)),
            tx("0x2", BOB, Some(CAROL)),
            tx("0x3", CAROL, Some(ALICE)),
        ];

        let kept: Vec<_> = filter.select(&block).into_iter().map(|t| t.hash).collect();
        assert_eq!(kept, vec!["0x1", "0x3"]);
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(ALICE).is_ok());
        assert!(validate_address("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_ok());
        assert!(validate_address("0x1234").is_err());
        assert!(validate_address("0xgggggggggggggggggggggggggggggggggggggggg").is_err());
        assert!(validate_address("").is_err());
    }
}
