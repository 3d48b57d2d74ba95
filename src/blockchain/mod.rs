pub mod chain_source;
pub mod rpc_client;
pub mod transaction_filter;
pub mod block_poller;

pub use chain_source::ChainSource;
pub use rpc_client::{RpcClient, DEFAULT_REQUEST_ID};
pub use transaction_filter::{validate_address, EventSink, FilterDecision, LogEventSink, TransactionFilter};
pub use block_poller::{BlockPoller, CycleReport, PollerConfig, PollerHandle, PollerState, PollerStatus};
