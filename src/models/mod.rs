pub mod transaction;
pub mod event;

pub use transaction::{Block, Transaction, parse_hex_quantity, to_hex_quantity};
pub use event::{EventKind, ObserverEvent};
