use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::{ChainSource, TransactionFilter};
use crate::config::ProcessingConfig;
use crate::error::{IndexerError, Result, SourceError};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval_seconds: u64,
    /// First block to watch; the chain head at startup when `None`.
    pub start_block: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            start_block: None,
        }
    }
}

impl From<&ProcessingConfig> for PollerConfig {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            poll_interval_seconds: config.poll_interval_seconds,
            start_block: config.start_block,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Uninitialized,
    Running,
    Stopped,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CycleReport {
    /// Transactions of the watermark block seen for the first time.
    pub rechecked: usize,
    pub blocks_processed: u64,
    pub transactions_recorded: usize,
    pub watermark: u64,
    /// Set when cancellation cut the cycle short.
    pub interrupted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub state: PollerState,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl Default for PollerStatus {
    fn default() -> Self {
        Self {
            state: PollerState::Uninitialized,
            last_cycle: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Cloneable view of a running poller: status reads and shutdown.
#[derive(Clone)]
pub struct PollerHandle {
    status: Arc<Mutex<PollerStatus>>,
    cancel: CancellationToken,
}

impl PollerHandle {
    pub fn status(&self) -> PollerStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn state(&self) -> PollerState {
        self.status().state
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Advances the watermark over the chain on a fixed interval, feeding every
/// new transaction through the filter.
pub struct BlockPoller<S: ChainSource> {
    source: S,
    store: Arc<dyn Storage>,
    filter: TransactionFilter,
    config: PollerConfig,
    handle: PollerHandle,
    /// Hashes of the last block read, so the watermark re-check only looks at
    /// transactions that arrived since.
    last_read: Mutex<Option<(u64, HashSet<String>)>>,
}

impl<S: ChainSource> BlockPoller<S> {
    pub fn new(
        source: S,
        store: Arc<dyn Storage>,
        filter: TransactionFilter,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            store,
            filter,
            config,
            handle: PollerHandle {
                status: Arc::new(Mutex::new(PollerStatus::default())),
                cancel: CancellationToken::new(),
            },
            last_read: Mutex::new(None),
        }
    }

    /// Use an externally owned token instead of the poller's own.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.handle.cancel = token;
        self
    }

    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn shutdown(&self) {
        info!("Requesting block poller shutdown");
        self.handle.shutdown();
    }

    fn is_cancelled(&self) -> bool {
        self.handle.cancel.is_cancelled()
    }

    fn remember_block(&self, height: u64, hashes: HashSet<String>) {
        *self.last_read.lock().unwrap_or_else(PoisonError::into_inner) = Some((height, hashes));
    }

    fn already_read(&self, height: u64) -> HashSet<String> {
        let last_read = self.last_read.lock().unwrap_or_else(PoisonError::into_inner);
        match &*last_read {
            Some((h, hashes)) if *h == height => hashes.clone(),
            _ => HashSet::new(),
        }
    }

    fn update_status(&self, update: impl FnOnce(&mut PollerStatus)) {
        let mut status = self.handle.status.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut status);
    }

    /// Run until cancelled. Returns an error only for failures that retrying
    /// cannot fix.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting block poller with {} second polling interval",
            self.config.poll_interval_seconds
        );

        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.handle.cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            if self.handle.state() == PollerState::Uninitialized {
                match self.initialize().await {
                    Ok(start) => {
                        info!("Block poller running from block {}", start);
                        self.update_status(|s| s.state = PollerState::Running);
                    }
                    Err(e) => {
                        if let Some(fatal) = self.record_failure(e) {
                            break Err(fatal);
                        }
                        continue;
                    }
                }
            }

            match self.poll_once().await {
                Ok(report) => {
                    self.update_status(|s| {
                        s.last_cycle = Some(report);
                        s.last_error = None;
                        s.consecutive_failures = 0;
                    });
                }
                Err(e) => {
                    if let Some(fatal) = self.record_failure(e) {
                        break Err(fatal);
                    }
                }
            }
        };

        self.update_status(|s| s.state = PollerState::Stopped);
        match &outcome {
            Ok(()) => info!("Block poller stopped at watermark {:?}", self.store.get_watermark()),
            Err(e) => warn!("Block poller stopped on fatal error: {}", e),
        }
        outcome
    }

    /// Log a failed step; hand the error back only if it must stop the loop.
    fn record_failure(&self, error: IndexerError) -> Option<IndexerError> {
        let context = LogContext::new("block_poller", "poll_cycle")
            .with_metadata("watermark", serde_json::json!(self.store.get_watermark()));
        ErrorLogger::log_error(&error, Some(context));

        self.update_status(|s| {
            s.last_error = Some(error.to_string());
            s.consecutive_failures += 1;
        });

        if error.is_recoverable() {
            None
        } else {
            Some(error)
        }
    }

    /// Establish the starting watermark if there is none yet.
    pub async fn initialize(&self) -> Result<u64> {
        if let Some(watermark) = self.store.get_watermark() {
            info!("Resuming from watermark {}", watermark);
            return Ok(watermark);
        }

        let start = match self.config.start_block {
            Some(block) => {
                info!("No previous state found, starting from configured block {}", block);
                block
            }
            None => {
                info!("No previous state found, starting from current chain head");
                self.source.current_height().await?
            }
        };

        self.store.set_watermark(start)?;
        Ok(start)
    }

    /// One polling cycle: re-check the watermark block, then process every
    /// block up to the chain head. Each completed block is committed together
    /// with its watermark, so an error or cancellation leaves the watermark at
    /// the last fully processed height.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let watermark = self.store.get_watermark().ok_or_else(|| {
            IndexerError::InvariantViolation("poll cycle started without a watermark".to_string())
        })?;

        let mut report = CycleReport {
            watermark,
            ..CycleReport::default()
        };

        let Some(head) = self.until_cancelled(self.source.current_height()).await? else {
            report.interrupted = true;
            return Ok(report);
        };

        // Blocks above the head are not ours to ask for yet.
        if head < watermark {
            debug!("Chain head {} is behind watermark {}, nothing to do", head, watermark);
            return Ok(report);
        }

        match self.recheck_block(watermark).await? {
            Some(recorded) => {
                report.rechecked = recorded;
                report.transactions_recorded += recorded;
            }
            None => {
                report.interrupted = true;
                return Ok(report);
            }
        }

        for height in watermark.saturating_add(1)..=head {
            if self.is_cancelled() {
                info!("Cancellation observed before block {}, ending cycle", height);
                report.interrupted = true;
                break;
            }

            let Some(recorded) = self.process_block(height).await? else {
                info!("Cancellation observed while fetching block {}, ending cycle", height);
                report.interrupted = true;
                break;
            };
            report.transactions_recorded += recorded;
            report.blocks_processed += 1;
            report.watermark = height;
        }

        MetricsLogger::log_poll_cycle(
            watermark,
            report.watermark,
            report.blocks_processed,
            report.transactions_recorded,
            started.elapsed().as_millis() as u64,
        );

        Ok(report)
    }

    /// Race a source call against cancellation. `Ok(None)` means cancelled
    /// first; the in-flight request is dropped.
    async fn until_cancelled<T>(
        &self,
        call: impl std::future::Future<Output = std::result::Result<T, SourceError>>,
    ) -> Result<Option<T>> {
        tokio::select! {
            biased;
            _ = self.handle.cancel.cancelled() => Ok(None),
            result = call => Ok(Some(result?)),
        }
    }

    /// Pick up transactions that landed in the watermark block after it was
    /// last read. Hashes read before or already indexed skip the filter.
    async fn recheck_block(&self, height: u64) -> Result<Option<usize>> {
        let Some(block) = self.until_cancelled(self.source.block_at(height)).await? else {
            return Ok(None);
        };

        let read_before = self.already_read(height);
        let unseen: Vec<_> = block
            .transactions
            .iter()
            .filter(|tx| !read_before.contains(&tx.hash))
            .filter(|tx| self.store.get_transaction_by_hash(&tx.hash).is_none())
            .cloned()
            .collect();

        let kept = self.filter.select(&unseen);
        let recorded = self.store.commit_block(height, &kept)?;
        self.remember_block(height, block.transactions.into_iter().map(|tx| tx.hash).collect());
        if recorded > 0 {
            debug!("Recovered {} transactions from watermark block {}", recorded, height);
        }
        Ok(Some(recorded))
    }

    async fn process_block(&self, height: u64) -> Result<Option<usize>> {
        let Some(block) = self.until_cancelled(self.source.block_at(height)).await? else {
            return Ok(None);
        };

        let kept = self.filter.select(&block.transactions);
        let recorded = self.store.commit_block(height, &kept)?;

        MetricsLogger::log_block_processed(height, block.transactions.len(), recorded);
        self.remember_block(height, block.transactions.into_iter().map(|tx| tx.hash).collect());
        Ok(Some(recorded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::RpcClient;
    use crate::storage::InMemoryStore;

    fn poller(config: PollerConfig) -> BlockPoller<RpcClient> {
        let store: Arc<dyn Storage> = Arc::new(InMemoryStore::default());
        let source = RpcClient::new("http://127.0.0.1:1".to_string()).unwrap();
        let filter = TransactionFilter::with_log_sink(store.clone());
        BlockPoller::new(source, store, filter, config)
    }

    #[test]
    fn test_poller_config_default() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval_seconds, 10);
        assert_eq!(config.start_block, None);
    }

    #[test]
    fn test_poller_config_from_processing_config() {
        let processing = ProcessingConfig {
            poll_interval_seconds: 3,
            start_block: Some(42),
            ..ProcessingConfig::default()
        };
        let config = PollerConfig::from(&processing);
        assert_eq!(config.poll_interval_seconds, 3);
        assert_eq!(config.start_block, Some(42));
    }

    #[test]
    fn test_poller_starts_uninitialized() {
        let poller = poller(PollerConfig::default());
        let status = poller.handle().status();
        assert_eq!(status.state, PollerState::Uninitialized);
        assert!(status.last_cycle.is_none());
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn test_shutdown_signal() {
        let poller = poller(PollerConfig::default());
        let handle = poller.handle();
        assert!(!handle.cancellation_token().is_cancelled());

        poller.shutdown();
        assert!(handle.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_initialize_with_configured_start_block() {
        let poller = poller(PollerConfig {
            poll_interval_seconds: 1,
            start_block: Some(500),
        });

        // No network call is needed when the start block is configured.
        assert_eq!(poller.initialize().await.unwrap(), 500);
        assert_eq!(poller.store.get_watermark(), Some(500));
    }

    #[tokio::test]
    async fn test_poll_once_without_watermark_is_invariant_violation() {
        let poller = poller(PollerConfig::default());
        let result = poller.poll_once().await;
        assert!(matches!(result, Err(IndexerError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_cancelled() {
        let poller = poller(PollerConfig::default());
        poller.shutdown();

        poller.run().await.unwrap();
        assert_eq!(poller.handle().state(), PollerState::Stopped);
    }
}
