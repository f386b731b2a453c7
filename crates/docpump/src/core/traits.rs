//! Capability traits for pluggable source and sink adapters.
//!
//! The engine never knows what backend it is talking to: anything that can
//! serve paginated reads is a [`DocumentSource`], anything that accepts
//! batched writes is a [`DocumentSink`]. Concrete adapters (search engines,
//! filesystems, object stores) live outside this crate and plug in here.

use async_trait::async_trait;

use crate::core::Batch;
use crate::error::Result;

/// Paginated read access to a document store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch up to `limit` documents starting at `offset`.
    ///
    /// An empty batch with no error signals that the source is exhausted.
    async fn get(&self, limit: usize, offset: u64) -> Result<Batch>;
}

/// Batched write access to a document store.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Persist a batch that was fetched with the given `limit` at `offset`.
    ///
    /// Returns the number of documents actually persisted, which may be
    /// less than the batch length (e.g. sink-side deduplication).
    async fn set(&self, batch: Batch, limit: usize, offset: u64) -> Result<u64>;
}
