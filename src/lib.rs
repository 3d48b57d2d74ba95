pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use blockchain::{BlockPoller, ChainSource, PollerConfig, PollerHandle, RpcClient, TransactionFilter};
pub use config::{ApiConfig, AppConfig, LoggingConfig, ProcessingConfig, RpcConfig};
pub use error::{IndexerError, Result, SourceError};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use storage::{InMemoryStore, Storage, UnsubscribePolicy};
