//! Content-addressed embedding cache: `hash -> vector`, model-scoped, one
//! file per model name under `embedding-cache/<model_name>.db`.
//!
//! `anyhow::Context` on every I/O op, `fs::create_dir_all` before first
//! write, backed by a tiny `rusqlite` table rather than a
//! rewritten-whole-file JSON blob: the cache needs point
//! `get`/`get_batch`/`set` without rewriting everything on every insert,
//! the same reasoning that justifies `rusqlite` for the graph store.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// A little-endian float32 vector of fixed width per cache instance.
pub type Vector = Vec<f32>;

pub struct EmbeddingCache {
    conn: Connection,
    dims: usize,
}

impl EmbeddingCache {
    /// Opens (creating if needed) the cache file for `model_name` under
    /// `<cache_dir>/embedding-cache/<model_name>.db`.
    pub fn open(cache_dir: &Path, model_name: &str, dims: usize) -> Result<Self> {
        let dir = cache_dir.join("embedding-cache");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create embedding cache dir: {}", dir.display()))?;
        let path = dir.join(format!("{model_name}.db"));
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open embedding cache: {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vectors (hash TEXT PRIMARY KEY, vector BLOB NOT NULL)",
        )?;
        Ok(EmbeddingCache { conn, dims })
    }

    pub fn open_in_memory(dims: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vectors (hash TEXT PRIMARY KEY, vector BLOB NOT NULL)",
        )?;
        Ok(EmbeddingCache { conn, dims })
    }

    fn encode(vec: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(vec.len() * 4);
        for v in vec {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Vector {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn get(&self, hash: &str) -> Result<Option<Vector>> {
        let mut stmt = self.conn.prepare_cached("SELECT vector FROM vectors WHERE hash = ?1")?;
        let result: Option<Vec<u8>> = stmt
            .query_row(rusqlite::params![hash], |r| r.get(0))
            .map(Some)
            .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(e) })?;
        Ok(result.map(|bytes| Self::decode(&bytes)))
    }

    pub fn get_batch(&self, hashes: &[String]) -> Result<HashMap<String, Vector>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = hashes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT hash, vector FROM vectors WHERE hash IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(hashes.iter()), |r| {
            let hash: String = r.get(0)?;
            let bytes: Vec<u8> = r.get(1)?;
            Ok((hash, bytes))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (hash, bytes) = row?;
            out.insert(hash, Self::decode(&bytes));
        }
        Ok(out)
    }

    pub fn set(&self, hash: &str, vector: &[f32]) -> Result<()> {
        anyhow::ensure!(
            vector.len() == self.dims,
            "embedding cache dimension mismatch: expected {}, got {}",
            self.dims,
            vector.len()
        );
        self.conn.execute(
            "INSERT INTO vectors (hash, vector) VALUES (?1, ?2)
             ON CONFLICT(hash) DO UPDATE SET vector = excluded.vector",
            rusqlite::params![hash, Self::encode(vector)],
        )?;
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Cache entries are immutable once written and never evicted by the
    /// core; `close` simply releases the connection (kept as an explicit
    /// method so callers get a symmetric `get`/`set`/`close` lifecycle).
    pub fn close(self) {
        drop(self.conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_the_vector() {
        let cache = EmbeddingCache::open_in_memory(4).unwrap();
        cache.set("abc123", &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let got = cache.get("abc123").unwrap().unwrap();
        assert_eq!(got, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn get_batch_returns_only_present_hashes() {
        let cache = EmbeddingCache::open_in_memory(2).unwrap();
        cache.set("h1", &[1.0, 2.0]).unwrap();
        let batch = cache
            .get_batch(&["h1".to_string(), "h2".to_string()])
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key("h1"));
    }

    #[test]
    fn set_rejects_mismatched_dimension() {
        let cache = EmbeddingCache::open_in_memory(4).unwrap();
        let err = cache.set("abc", &[1.0, 2.0]).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn missing_hash_returns_none() {
        let cache = EmbeddingCache::open_in_memory(4).unwrap();
        assert!(cache.get("missing").unwrap().is_none());
    }
}
