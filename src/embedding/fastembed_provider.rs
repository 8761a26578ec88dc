//! Production `EmbeddingProvider` backed by `fastembed`. Only has to answer
//! `embed_query`/`embed_document`, run off the calling task via
//! `tokio::task::spawn_blocking` since `fastembed`'s `embed` call is itself
//! synchronous.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::{Mutex, OnceCell};

use super::{ContextOverflow, EmbeddingProvider};

const DEFAULT_MODEL: EmbeddingModel = EmbeddingModel::AllMiniLML6V2;
const QUERY_PREFIX: &str = "query: ";
const DOCUMENT_PREFIX: &str = "passage: ";

pub struct FastEmbedProvider {
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
    max_context_length: usize,
}

impl FastEmbedProvider {
    pub fn new(max_context_length: usize) -> Self {
        FastEmbedProvider {
            model: OnceCell::new(),
            max_context_length,
        }
    }

    async fn model(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        self.model
            .get_or_try_init(|| async {
                tokio::task::spawn_blocking(|| {
                    TextEmbedding::try_new(
                        InitOptions::new(DEFAULT_MODEL).with_show_download_progress(false),
                    )
                    .context("failed to initialize fastembed model")
                })
                .await
                .context("fastembed init task panicked")?
                .map(|m| Arc::new(Mutex::new(m)))
            })
            .await
            .cloned()
    }

    async fn embed_with_prefix(&self, text: &str, prefix: &str) -> Result<Vec<f32>> {
        if text.len() > self.max_context_length {
            bail!(ContextOverflow { len: text.len(), max: self.max_context_length });
        }
        let model = self.model().await?;
        let input = format!("{prefix}{text}");
        let vectors = tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(vec![input], None)
        })
        .await
        .context("embedding task panicked")?
        .context("fastembed embed call failed")?;

        vectors
            .into_iter()
            .next()
            .context("fastembed returned no vectors")
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn initialize(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_prefix(text, QUERY_PREFIX).await
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_prefix(text, DOCUMENT_PREFIX).await
    }

    fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
