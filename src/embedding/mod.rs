//! Embedding provider: async `embed_query`/`embed_document` plus a
//! `max_context_length` hint. The model runner itself is explicitly out of
//! scope — everything downstream consumes providers only through this
//! trait.

#[cfg(feature = "semantic")]
pub mod fastembed_provider;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;

/// Raised by a provider when the input exceeds what the underlying model
/// can accept. The indexer treats this as a signal to fall back
/// progressively, never as a hard failure.
#[derive(Debug, thiserror::Error)]
#[error("embedding input too long: {len} bytes > max {max}")]
pub struct ContextOverflow {
    pub len: usize,
    pub max: usize,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Idempotent; loads the model (or connects to the runner) if not
    /// already initialized.
    async fn initialize(&self) -> Result<()>;

    /// Embeds a search query. Providers may prepend a query-specific
    /// prefix; callers treat the input text opaquely.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a document (a node's canonical embedding input). Returns
    /// `ContextOverflow` (downcast-able via `anyhow::Error::downcast_ref`)
    /// when `text` exceeds `max_context_length()`.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Hint used by the indexer's progressive-fallback strategy; the hard
    /// final truncation target is `max_content_length` **bytes**.
    fn max_context_length(&self) -> usize;

    async fn dispose(&self) -> Result<()>;
}
