use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SourceError;
use crate::models::Block;

/// Read access to a remote chain.
///
/// Implementations do not retry; a failed call is reported as-is and the
/// poller tries again on its next cycle.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Latest block height known to the source.
    async fn current_height(&self) -> Result<u64, SourceError>;

    /// Full block at `height`, transactions included. Callers keep `height`
    /// at or below [`ChainSource::current_height`].
    async fn block_at(&self, height: u64) -> Result<Block, SourceError>;
}

#[async_trait]
impl<T: ChainSource + ?Sized> ChainSource for Arc<T> {
    async fn current_height(&self) -> Result<u64, SourceError> {
        (**self).current_height().await
    }

    async fn block_at(&self, height: u64) -> Result<Block, SourceError> {
        (**self).block_at(height).await
    }
}
