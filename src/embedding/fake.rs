//! Deterministic fake provider used by tests: hashes the input to a
//! fixed-size vector and supports a configurable `max_content_length` that
//! forces overflow behavior.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::EmbeddingProvider;

pub struct FakeEmbeddingProvider {
    dims: usize,
    max_content_length: usize,
    embed_calls: AtomicUsize,
}

impl FakeEmbeddingProvider {
    pub fn new(dims: usize, max_content_length: usize) -> Self {
        FakeEmbeddingProvider {
            dims,
            max_content_length,
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub fn embed_call_count(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// FNV-1a over the bytes, folded into a fixed-width vector — no
    /// external hashing crate needed for a deterministic, test-only fake.
    fn hash_to_vector(text: &str) -> Vec<f32> {
        let dims = 8;
        let mut acc = vec![0u64; dims];
        let mut hash: u64 = 0xcbf29ce484222325;
        for (i, byte) in text.bytes().enumerate() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
            acc[i % dims] = acc[i % dims].wrapping_add(hash);
        }
        acc.into_iter().map(|v| ((v % 1000) as f32) / 1000.0).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(resize(Self::hash_to_vector(text), self.dims))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if text.len() > self.max_content_length {
            bail!(super::ContextOverflow { len: text.len(), max: self.max_content_length });
        }
        Ok(resize(Self::hash_to_vector(text), self.dims))
    }

    fn max_context_length(&self) -> usize {
        self.max_content_length
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

fn resize(mut v: Vec<f32>, dims: usize) -> Vec<f32> {
    v.resize(dims, 0.0);
    v.truncate(dims);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_document_is_deterministic() {
        let provider = FakeEmbeddingProvider::new(8, 1000);
        let a = provider.embed_document("hello world").await.unwrap();
        let b = provider.embed_document("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embed_document_overflows_past_max_content_length() {
        let provider = FakeEmbeddingProvider::new(8, 10);
        let err = provider.embed_document("this text is definitely longer than ten bytes").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn embed_document_within_limit_succeeds() {
        let provider = FakeEmbeddingProvider::new(8, 1000);
        let vec = provider.embed_document("short").await.unwrap();
        assert_eq!(vec.len(), 8);
    }
}
