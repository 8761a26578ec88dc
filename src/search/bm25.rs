//! BM25 (Okapi) lexical index over `{symbol, file, snippet, prefixes}`,
//! field-weighted.
//!
//! Keys documents by [`NodeId`] directly rather than an interned symbol —
//! the store-backed design has no process-wide symbol table to intern
//! against — over the four fields above plus a derived `prefixes` field
//! for partial-identifier matches.

use std::collections::HashMap;

use crate::ids::NodeId;

/// Field types for weighted BM25 scoring.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    File,
    Symbol,
    Snippet,
    Prefix,
}

impl Field {
    fn index(self) -> usize {
        match self {
            Field::File => 0,
            Field::Symbol => 1,
            Field::Snippet => 2,
            Field::Prefix => 3,
        }
    }
}

const NUM_FIELDS: usize = 4;

/// Weights for each field in BM25 scoring.
#[derive(Clone, Debug)]
pub struct FieldWeights {
    pub file: f32,
    pub symbol: f32,
    pub snippet: f32,
    pub prefix: f32,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            file: 2.0,
            symbol: 1.8,
            snippet: 1.0,
            prefix: 1.4,
        }
    }
}

/// BM25 parameters.
#[derive(Copy, Clone, Debug)]
pub struct Bm25Params {
    /// Term frequency saturation parameter (typically 1.2-2.0).
    pub k1: f32,
    /// Length normalization parameter (typically 0.75).
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Clone, Debug)]
struct Posting {
    doc_id: u32,
    tf_by_field: [u32; NUM_FIELDS],
}

#[derive(Clone, Debug)]
struct DocStats {
    id: NodeId,
    len_by_field: [u32; NUM_FIELDS],
    snippet: String,
}

/// BM25 search index.
#[derive(Default, Clone, Debug)]
pub struct Bm25Index {
    inv: HashMap<String, Vec<Posting>>,
    docs: Vec<DocStats>,
    avg_len_by_field: [f32; NUM_FIELDS],
    df: HashMap<String, u32>,
    id_to_doc: HashMap<NodeId, u32>,
}

#[derive(Debug, Clone)]
pub struct Bm25SearchResult {
    pub id: NodeId,
    pub score: f32,
    pub doc_id: u32,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a document.
    pub fn add_document(&mut self, id: NodeId, file: &str, symbol: &str, snippet: &str) {
        self.remove(&id);

        let doc_id = self.docs.len() as u32;
        let mut lens = [0u32; NUM_FIELDS];

        let mut add = |inv: &mut HashMap<String, Vec<Posting>>, field: Field, token: &str| {
            if token.is_empty() {
                return;
            }
            let term = token.to_ascii_lowercase();
            let postings = inv.entry(term).or_default();
            match postings.last_mut() {
                Some(last) if last.doc_id == doc_id => {
                    last.tf_by_field[field.index()] += 1;
                }
                _ => {
                    let mut tf = [0u32; NUM_FIELDS];
                    tf[field.index()] = 1;
                    postings.push(Posting { doc_id, tf_by_field: tf });
                }
            }
            lens[field.index()] += 1;
        };

        for t in path_tokens(file) {
            add(&mut self.inv, Field::File, &t);
        }
        for t in tokenize(symbol) {
            add(&mut self.inv, Field::Symbol, t);
        }
        for t in tokenize(snippet) {
            add(&mut self.inv, Field::Snippet, t);
        }
        for t in generate_prefixes(symbol) {
            add(&mut self.inv, Field::Prefix, &t);
        }

        self.id_to_doc.insert(id.clone(), doc_id);
        self.docs.push(DocStats {
            id,
            len_by_field: lens,
            snippet: snippet.to_string(),
        });
    }

    /// Removes a document, tombstoning its postings in place (the
    /// corresponding `DocStats` slot becomes a zero-length placeholder so
    /// every other `doc_id` remains valid — rebuild rather than compact).
    pub fn remove(&mut self, id: &NodeId) {
        let Some(doc_id) = self.id_to_doc.remove(id) else { return };
        if let Some(doc) = self.docs.get_mut(doc_id as usize) {
            doc.len_by_field = [0; NUM_FIELDS];
            doc.snippet.clear();
        }
        for postings in self.inv.values_mut() {
            postings.retain(|p| p.doc_id != doc_id);
        }
    }

    /// Removes every document whose id belongs to `file_path`.
    pub fn remove_by_file(&mut self, file_path: &str) {
        let ids: Vec<NodeId> = self
            .id_to_doc
            .keys()
            .filter(|id| id.as_str().starts_with(&format!("{file_path}:")))
            .cloned()
            .collect();
        for id in ids {
            self.remove(&id);
        }
    }

    /// Finalize the index (compute statistics). Must be called after a
    /// batch of `add_document`/`remove` calls and before `search`.
    pub fn finalize(&mut self) {
        let n_docs = self.docs.len().max(1) as f32;

        let mut sum = [0u64; NUM_FIELDS];
        for doc in &self.docs {
            for (s, &len) in sum.iter_mut().zip(doc.len_by_field.iter()) {
                *s += len as u64;
            }
        }
        for (avg, &s) in self.avg_len_by_field.iter_mut().zip(sum.iter()) {
            *avg = s as f32 / n_docs;
        }

        self.df.clear();
        for (term, postings) in &self.inv {
            self.df.insert(term.clone(), postings.len() as u32);
        }
    }

    pub fn search(
        &self,
        query: &str,
        weights: &FieldWeights,
        params: Bm25Params,
        top_k: usize,
    ) -> Vec<Bm25SearchResult> {
        let mut scores: HashMap<u32, f32> = HashMap::new();
        let n_docs = self.docs.len().max(1) as f32;
        let field_weights = [weights.file, weights.symbol, weights.snippet, weights.prefix];

        for term in tokenize(query) {
            let term_lower = term.to_ascii_lowercase();
            let Some(postings) = self.inv.get(&term_lower) else {
                continue;
            };

            let df = *self.df.get(&term_lower).unwrap_or(&1) as f32;
            let idf = ((n_docs - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in postings {
                let doc = &self.docs[posting.doc_id as usize];

                let mut tf_weighted = 0.0f32;
                for (i, &weight) in field_weights.iter().enumerate() {
                    if posting.tf_by_field[i] > 0 {
                        tf_weighted += weight * posting.tf_by_field[i] as f32;
                    }
                }

                let mut len = 0.0f32;
                let mut avg_len = 0.0f32;
                for (i, &weight) in field_weights.iter().enumerate() {
                    len += weight * doc.len_by_field[i] as f32;
                    avg_len += weight * self.avg_len_by_field[i];
                }

                let norm = 1.0 - params.b + params.b * (len / avg_len.max(1e-6));
                let denom = tf_weighted + params.k1 * norm;
                let score = idf * (tf_weighted * (params.k1 + 1.0)) / denom.max(1e-6);

                *scores.entry(posting.doc_id).or_default() += score;
            }
        }

        let mut results: Vec<_> = scores
            .into_iter()
            .filter(|(doc_id, _)| !self.docs[*doc_id as usize].id.as_str().is_empty())
            .map(|(doc_id, score)| Bm25SearchResult {
                id: self.docs[doc_id as usize].id.clone(),
                score,
                doc_id,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    pub fn len(&self) -> usize {
        self.id_to_doc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_doc.is_empty()
    }

    pub fn count(&self) -> usize {
        self.len()
    }

    pub fn doc_id_for(&self, id: &NodeId) -> Option<u32> {
        self.id_to_doc.get(id).copied()
    }

    pub fn id_for_doc(&self, doc_id: u32) -> Option<&NodeId> {
        self.docs.get(doc_id as usize).map(|d| &d.id)
    }
}

/// Splits on non-word characters and further splits camelCase/snake_case
/// identifiers.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
        .flat_map(split_identifier)
}

/// Splits an identifier into sub-tokens (camelCase, snake_case), also
/// keeping the whole identifier as a token.
pub fn split_identifier(s: &str) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;

    for i in 1..bytes.len() {
        let prev = bytes[i - 1] as char;
        let curr = bytes[i] as char;
        let boundary = curr == '_' || (prev.is_ascii_lowercase() && curr.is_ascii_uppercase());

        if boundary {
            if start < i && bytes[start] != b'_' {
                tokens.push(&s[start..i]);
            }
            start = if curr == '_' { i + 1 } else { i };
        }
    }

    if start < s.len() && bytes[start] != b'_' {
        tokens.push(&s[start..]);
    }

    if tokens.len() > 1 {
        tokens.push(s);
    }

    tokens
}

/// `prefixes`: camel-case splits and substring prefixes of the symbol, so a
/// query for `provider` recalls `ProviderService`.
pub fn generate_prefixes(symbol: &str) -> Vec<String> {
    let mut out = Vec::new();
    for token in split_identifier(symbol) {
        let lower = token.to_ascii_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        for end in 1..=chars.len() {
            out.push(chars[..end].iter().collect());
        }
    }
    out
}

/// Extracts tokens from a file path (directory components + base name,
/// extension stripped).
pub fn path_tokens(path: &str) -> Vec<String> {
    path.split('/')
        .flat_map(|s| {
            let base = s.rsplit_once('.').map(|(a, _)| a).unwrap_or(s);
            tokenize(base).map(|t| t.to_lowercase()).collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_snake_and_camel_case() {
        let tokens: Vec<_> = tokenize("hello_world").collect();
        assert!(tokens.contains(&"hello"));
        assert!(tokens.contains(&"world"));

        let tokens: Vec<_> = tokenize("HelloWorld").collect();
        assert!(tokens.contains(&"Hello"));
        assert!(tokens.contains(&"World"));
    }

    #[test]
    fn generate_prefixes_recalls_camel_case_substrings() {
        let prefixes = generate_prefixes("ProviderService");
        assert!(prefixes.contains(&"provider".to_string()));
        assert!(prefixes.contains(&"prov".to_string()));
    }

    #[test]
    fn bm25_basic_ranks_matching_symbol_first() {
        let mut index = Bm25Index::new();
        let id1 = NodeId::from("src/utils.ts:Function:add_numbers");
        let id2 = NodeId::from("src/math.ts:Function:subtract_numbers");

        index.add_document(
            id1.clone(),
            "src/utils.ts",
            "add_numbers",
            "fn add(a, b) { return a + b }",
        );
        index.add_document(
            id2,
            "src/math.ts",
            "subtract_numbers",
            "fn subtract(a, b) { return a - b }",
        );
        index.finalize();

        let results = index.search("add numbers", &FieldWeights::default(), Bm25Params::default(), 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].id, id1);
    }

    #[test]
    fn remove_by_file_drops_matching_documents() {
        let mut index = Bm25Index::new();
        let id = NodeId::from("src/a.ts:Function:foo");
        index.add_document(id.clone(), "src/a.ts", "foo", "function foo() {}");
        index.finalize();
        assert_eq!(index.len(), 1);

        index.remove_by_file("src/a.ts");
        assert_eq!(index.len(), 0);
    }
}
