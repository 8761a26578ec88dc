//! Hybrid search index: BM25 lexical index over `{symbol, file, snippet,
//! prefixes}` plus a vector field, fused with reciprocal rank fusion.
//!
//! The RRF/weighted-combination fusion core operates on opaque `u32` doc
//! ids. [`SearchIndex`] wraps it: it owns a [`Bm25Index`] plus an
//! in-memory vector map of its own (distinct from the embedding cache,
//! which is content-addressed and persistent) and assigns a transient
//! surrogate id per search call so the `u32`-keyed fusion core needs no
//! changes to work over [`NodeId`] documents.

pub mod bm25;

pub use bm25::{Bm25Index, Bm25Params, Bm25SearchResult, FieldWeights};

use std::collections::HashMap;

use crate::ids::NodeId;

/// Configuration for hybrid search.
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub semantic_top_k: usize,
    pub bm25_top_k: usize,
    pub final_top_k: usize,
    pub semantic_weight: f32,
    pub bm25_weight: f32,
    pub rrf_k: f32,
    pub use_rrf: bool,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            semantic_top_k: 50,
            bm25_top_k: 50,
            final_top_k: 10,
            semantic_weight: 0.4,
            bm25_weight: 0.6,
            rrf_k: 60.0,
            use_rrf: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridSearchResult {
    pub doc_id: u32,
    pub score: f32,
    pub semantic_score: Option<f32>,
    pub bm25_score: Option<f32>,
    pub found_by: FoundBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundBy {
    SemanticOnly,
    Bm25Only,
    Both,
}

/// Hybrid search engine combining semantic and BM25 search via fusion.
pub struct HybridSearch {
    config: HybridSearchConfig,
}

impl HybridSearch {
    pub fn new(config: HybridSearchConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(HybridSearchConfig::default())
    }

    pub fn search(
        &self,
        query: &str,
        semantic_results: Vec<(u32, f32)>,
        bm25_results: Vec<(u32, f32)>,
    ) -> Vec<HybridSearchResult> {
        if self.config.use_rrf {
            self.search_rrf(query, semantic_results, bm25_results)
        } else {
            self.search_weighted(query, semantic_results, bm25_results)
        }
    }

    /// RRF score = sum(weight / (k + rank_i + 1)) for each ranking.
    fn search_rrf(
        &self,
        _query: &str,
        semantic_results: Vec<(u32, f32)>,
        bm25_results: Vec<(u32, f32)>,
    ) -> Vec<HybridSearchResult> {
        let mut scores: HashMap<u32, (f32, Option<f32>, Option<f32>, FoundBy)> = HashMap::new();
        let k = self.config.rrf_k;

        for (rank, (doc_id, sim_score)) in semantic_results.iter().enumerate() {
            let rrf_score = self.config.semantic_weight / (k + rank as f32 + 1.0);
            scores.insert(*doc_id, (rrf_score, Some(*sim_score), None, FoundBy::SemanticOnly));
        }

        for (rank, (doc_id, bm25_score)) in bm25_results.iter().enumerate() {
            let rrf_score = self.config.bm25_weight / (k + rank as f32 + 1.0);
            scores
                .entry(*doc_id)
                .and_modify(|(score, _sem, bm, found)| {
                    *score += rrf_score;
                    *bm = Some(*bm25_score);
                    *found = FoundBy::Both;
                })
                .or_insert((rrf_score, None, Some(*bm25_score), FoundBy::Bm25Only));
        }

        let mut results: Vec<HybridSearchResult> = scores
            .into_iter()
            .map(|(doc_id, (score, semantic_score, bm25_score, found_by))| HybridSearchResult {
                doc_id,
                score,
                semantic_score,
                bm25_score,
                found_by,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(self.config.final_top_k);
        results
    }

    fn search_weighted(
        &self,
        _query: &str,
        semantic_results: Vec<(u32, f32)>,
        bm25_results: Vec<(u32, f32)>,
    ) -> Vec<HybridSearchResult> {
        let mut scores: HashMap<u32, (f32, Option<f32>, Option<f32>, FoundBy)> = HashMap::new();

        for (doc_id, sim_score) in semantic_results {
            let weighted = self.config.semantic_weight * sim_score;
            scores.insert(doc_id, (weighted, Some(sim_score), None, FoundBy::SemanticOnly));
        }

        let max_bm25 = bm25_results.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);

        for (doc_id, bm25_score) in bm25_results {
            let normalized = if max_bm25 > 0.0 { bm25_score / max_bm25 } else { 0.0 };
            let weighted = self.config.bm25_weight * normalized;
            scores
                .entry(doc_id)
                .and_modify(|(score, _sem, bm, found)| {
                    *score += weighted;
                    *bm = Some(bm25_score);
                    *found = FoundBy::Both;
                })
                .or_insert((weighted, None, Some(bm25_score), FoundBy::Bm25Only));
        }

        let mut results: Vec<HybridSearchResult> = scores
            .into_iter()
            .map(|(doc_id, (score, semantic_score, bm25_score, found_by))| HybridSearchResult {
                doc_id,
                score,
                semantic_score,
                bm25_score,
                found_by,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(self.config.final_top_k);
        results
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: NodeId,
    pub file: String,
    pub symbol: String,
    pub score: f32,
}

/// The unified index over `{id, symbol, file, snippet, prefixes, vector?}`
/// documents. Vectors live only here (and in the embedding cache, C3) — not
/// in the graph store.
pub struct SearchIndex {
    bm25: Bm25Index,
    vectors: HashMap<NodeId, Vec<f32>>,
    files: HashMap<NodeId, String>,
    symbols: HashMap<NodeId, String>,
    hybrid: HybridSearch,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchIndex {
    pub fn new() -> Self {
        SearchIndex {
            bm25: Bm25Index::new(),
            vectors: HashMap::new(),
            files: HashMap::new(),
            symbols: HashMap::new(),
            hybrid: HybridSearch::with_default_config(),
        }
    }

    /// Upserts `(id, fields, vector)`. Re-running `finalize()` on every
    /// upsert keeps the index always query-ready at the cost of O(docs)
    /// work per write — acceptable since writes are funneled through the
    /// single indexer task, never the query path.
    pub fn upsert(&mut self, id: NodeId, file: &str, symbol: &str, snippet: &str, vector: Option<Vec<f32>>) {
        self.bm25.add_document(id.clone(), file, symbol, snippet);
        self.bm25.finalize();
        self.files.insert(id.clone(), file.to_string());
        self.symbols.insert(id.clone(), symbol.to_string());
        match vector {
            Some(v) => {
                self.vectors.insert(id, v);
            }
            None => {
                self.vectors.remove(&id);
            }
        }
    }

    pub fn remove_by_file(&mut self, file_path: &str) {
        self.bm25.remove_by_file(file_path);
        self.bm25.finalize();
        let prefix = format!("{file_path}:");
        self.vectors.retain(|id, _| !id.as_str().starts_with(&prefix));
        self.files.retain(|id, _| !id.as_str().starts_with(&prefix));
        self.symbols.retain(|id, _| !id.as_str().starts_with(&prefix));
    }

    pub fn count(&self) -> usize {
        self.bm25.count()
    }

    /// Cosine similarity between `id`'s stored vector and `query_vector`;
    /// `None` if `id` has no vector indexed (the orchestrator's
    /// topic-filter pass treats that as "keep" rather than "drop").
    pub fn vector_similarity(&self, id: &NodeId, query_vector: &[f32]) -> Option<f32> {
        self.vectors.get(id).map(|v| cosine_similarity(query_vector, v))
    }

    /// `search(query, vector?, limit)`. Fuses lexical and (if `vector` is
    /// given) vector k-NN results with RRF.
    pub fn search(&self, query: &str, vector: Option<&[f32]>, limit: usize) -> Vec<SearchHit> {
        let bm25_raw = self.bm25.search(
            query,
            &FieldWeights::default(),
            Bm25Params::default(),
            limit.max(50),
        );

        let semantic_raw: Vec<(NodeId, f32)> = match vector {
            Some(v) => {
                let mut sims: Vec<(NodeId, f32)> = self
                    .vectors
                    .iter()
                    .map(|(id, vec)| (id.clone(), cosine_similarity(v, vec)))
                    .collect();
                sims.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                sims.truncate(limit.max(50));
                sims
            }
            None => Vec::new(),
        };

        // Assign a stable surrogate u32 per distinct NodeId so the fusion
        // core (which scores by u32) can be reused unmodified.
        let mut surrogate: HashMap<NodeId, u32> = HashMap::new();
        let mut next = 0u32;
        let mut surrogate_of = |id: &NodeId, surrogate: &mut HashMap<NodeId, u32>| -> u32 {
            if let Some(s) = surrogate.get(id) {
                return *s;
            }
            let s = next;
            next += 1;
            surrogate.insert(id.clone(), s);
            s
        };

        let bm25_scored: Vec<(u32, f32)> = bm25_raw
            .iter()
            .map(|r| (surrogate_of(&r.id, &mut surrogate), r.score))
            .collect();
        let semantic_scored: Vec<(u32, f32)> = semantic_raw
            .iter()
            .map(|(id, score)| (surrogate_of(id, &mut surrogate), *score))
            .collect();

        let reverse: HashMap<u32, NodeId> = surrogate.iter().map(|(id, s)| (*s, id.clone())).collect();

        let fused = self.hybrid.search(query, semantic_scored, bm25_scored);

        fused
            .into_iter()
            .filter_map(|r| {
                let id = reverse.get(&r.doc_id)?.clone();
                Some(SearchHit {
                    file: self.files.get(&id).cloned().unwrap_or_default(),
                    symbol: self.symbols.get(&id).cloned().unwrap_or_default(),
                    id,
                    score: r.score,
                })
            })
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_fuses_both_rankings() {
        let config = HybridSearchConfig::default();
        let search = HybridSearch::new(config);

        let semantic = vec![(1u32, 0.9), (2u32, 0.7), (3u32, 0.5)];
        let bm25 = vec![(2u32, 5.0), (1u32, 4.0), (3u32, 2.0)];

        let results = search.search("test", semantic, bm25);

        assert!(!results.is_empty());
        let found_by_both: Vec<_> = results.iter().filter(|r| r.found_by == FoundBy::Both).collect();
        assert!(found_by_both.len() >= 2);
    }

    #[test]
    fn weighted_combination_sums_both_signals() {
        let config = HybridSearchConfig {
            use_rrf: false,
            semantic_weight: 0.5,
            bm25_weight: 0.5,
            ..Default::default()
        };
        let search = HybridSearch::new(config);

        let semantic = vec![(1u32, 0.8)];
        let bm25 = vec![(1u32, 10.0)];

        let results = search.search("test", semantic, bm25);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].found_by, FoundBy::Both);
        assert!(results[0].score > 0.5);
    }

    #[test]
    fn search_index_fuses_lexical_and_vector_hits() {
        let mut index = SearchIndex::new();
        index.upsert(
            NodeId::from("src/a.ts:Function:processItems"),
            "src/a.ts",
            "processItems",
            "function processItems(xs, fn) { xs.map(fn); }",
            Some(vec![1.0, 0.0, 0.0]),
        );
        index.upsert(
            NodeId::from("src/b.ts:Function:unrelated"),
            "src/b.ts",
            "unrelated",
            "function unrelated() {}",
            Some(vec![0.0, 1.0, 0.0]),
        );

        let hits = index.search("processItems", Some(&[1.0, 0.0, 0.0]), 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].symbol, "processItems");
    }

    #[test]
    fn remove_by_file_clears_vectors_too() {
        let mut index = SearchIndex::new();
        let id = NodeId::from("src/a.ts:Function:foo");
        index.upsert(id, "src/a.ts", "foo", "function foo() {}", Some(vec![1.0]));
        assert_eq!(index.count(), 1);
        index.remove_by_file("src/a.ts");
        assert_eq!(index.count(), 0);
        assert!(index.vectors.is_empty());
    }
}
