use serde::Serialize;

use crate::models::Transaction;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum EventKind {
    #[serde(rename = "TRANSACTION_SENT")]
    TransactionSent,
    #[serde(rename = "TRANSACTION_RECEIVED")]
    TransactionReceived,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TransactionSent => "TRANSACTION_SENT",
            EventKind::TransactionReceived => "TRANSACTION_RECEIVED",
        }
    }
}

/// Notification raised when a subscribed address takes part in a transaction.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ObserverEvent {
    pub kind: EventKind,
    pub address: String,
    pub transaction: Transaction,
}
