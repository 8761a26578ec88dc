//! Indexer: `index_file`'s parse → extract → store → embed → search-upsert
//! pipeline, and `full_index`'s directory-walk + manifest-diff
//! orchestration over it, reusing `discovery.rs` for the walk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::discovery::FileDiscovery;
use crate::embedding::EmbeddingProvider;
use crate::embedding_cache::EmbeddingCache;
use crate::extractor::{self, TreeSitterSourceFile};
use crate::ids::RelPath;
use crate::registry::ProjectRegistry;
use crate::search::SearchIndex;
use crate::store::SharedStore;
use crate::types::{Node, NodeType};

/// Function/method embedding bodies are capped at this many lines before
/// truncation kicks in.
pub const MAX_SOURCE_LINES: usize = 50;

/// One entry of the on-disk manifest (`<cache>/manifest.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub mtime_ms: i64,
    pub size: u64,
    pub content_hash: String,
}

/// `file_path -> {mtime,size,content_hash}` recording the state of the
/// last successful index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub files: HashMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Manifest {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    /// Atomic rewrite: temp file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Shared handles every indexing call needs. Cloned cheaply (everything is
/// an `Arc`); the watcher and the CLI's `full_index` both build one of
/// these once at startup.
#[derive(Clone)]
pub struct IndexContext {
    pub project_root: PathBuf,
    pub store: SharedStore,
    pub search_index: Arc<Mutex<SearchIndex>>,
    pub registry: Arc<ProjectRegistry>,
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub cache: Option<Arc<Mutex<EmbeddingCache>>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub nodes_added: usize,
    pub edges_added: usize,
}

/// Never fails on embedding overflow —
/// only extraction/store/cache I/O errors propagate.
pub async fn index_file(abs_path: &Path, ctx: &IndexContext) -> Result<IndexStats> {
    let source = std::fs::read_to_string(abs_path)?;
    let source_file = TreeSitterSourceFile::parse(&ctx.project_root, abs_path, &source)?;
    let file_path = source_file.file_path().clone();

    let (nodes, edges) = extractor::extract(&source_file, &ctx.registry);

    // Step 2: single transaction, delete-then-insert (per-file atomic replace).
    ctx.store.replace_file(&file_path, &nodes, &edges)?;
    ctx.registry.register_declarations(&file_path, &nodes);
    ctx.registry.register_reexports(&file_path, &source_file);

    for node in &nodes {
        if let Err(e) = embed_and_index_node(node, ctx).await {
            warn!(node = %node.id, error = %e, "embedding failed for node; continuing without a vector");
        }
    }

    Ok(IndexStats { nodes_added: nodes.len(), edges_added: edges.len() })
}

async fn embed_and_index_node(node: &Node, ctx: &IndexContext) -> Result<()> {
    let input = canonical_embedding_input(node);
    let hash = sha256_hex(&input);

    let cached = match &ctx.cache {
        Some(cache) => cache.lock().get(&hash)?,
        None => None,
    };

    let vector = if let Some(v) = cached {
        Some(v)
    } else if let Some(provider) = &ctx.embedding {
        Some(embed_with_progressive_fallback(provider.as_ref(), node, &input).await?)
    } else {
        None
    };

    if let Some(v) = &vector {
        if let Some(cache) = &ctx.cache {
            cache.lock().set(&hash, v)?;
        }
    }

    let mut search_index = ctx.search_index.lock();
    search_index.upsert(
        node.id.clone(),
        node.file_path.as_str(),
        &node.name,
        &node.snippet,
        vector,
    );

    Ok(())
}

/// Progressive fallback: never allowed to be the cause of a hard failure.
async fn embed_with_progressive_fallback(
    provider: &dyn EmbeddingProvider,
    node: &Node,
    input: &str,
) -> Result<Vec<f32>> {
    match provider.embed_document(input).await {
        Ok(v) => return Ok(v),
        Err(e) if e.downcast_ref::<crate::embedding::ContextOverflow>().is_none() => return Err(e),
        Err(_) => {}
    }

    if node.node_type == NodeType::Class {
        let stripped = strip_method_bodies(&node.snippet);
        let retry = format!("{}\n{}", embedding_header(node), stripped);
        match provider.embed_document(&retry).await {
            Ok(v) => return Ok(v),
            Err(e) if e.downcast_ref::<crate::embedding::ContextOverflow>().is_none() => return Err(e),
            Err(_) => {}
        }
    }

    let truncated = truncate_to_lines(input, MAX_SOURCE_LINES / 2);
    match provider.embed_document(&truncated).await {
        Ok(v) => return Ok(v),
        Err(e) if e.downcast_ref::<crate::embedding::ContextOverflow>().is_none() => return Err(e),
        Err(_) => {}
    }

    let max_bytes = provider.max_context_length();
    let hard_truncated = hard_truncate_bytes(input, max_bytes);
    provider.embed_document(&hard_truncated).await
}

fn embedding_header(node: &Node) -> String {
    match node.node_type {
        NodeType::Function | NodeType::Method => {
            let params = node
                .props
                .parameters
                .iter()
                .map(|p| match &p.type_ {
                    Some(t) => format!("{}: {}", p.name, t),
                    None => p.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let ret = node.props.return_type.as_deref().unwrap_or("void");
            format!("// Function: {}({}) -> {}", node.name, params, ret)
        }
        NodeType::Class => format!("// Class: {}", node.name),
        NodeType::Interface => format!("// Interface: {}", node.name),
        NodeType::TypeAlias => format!("// TypeAlias: {}", node.name),
        NodeType::Variable => format!("// Variable: {}", node.name),
    }
}

/// Builds the canonical embedding input for `node`.
pub fn canonical_embedding_input(node: &Node) -> String {
    let header = embedding_header(node);
    match node.node_type {
        NodeType::Function | NodeType::Method => {
            let body = truncate_to_lines(&node.snippet, MAX_SOURCE_LINES);
            format!("{header}\n{body}")
        }
        NodeType::Class => {
            let stripped = strip_method_bodies(&node.snippet);
            format!("{header}\n{stripped}")
        }
        _ => format!("{header}\n{}", node.snippet),
    }
}

/// Truncates to at most `max_lines` lines, appending a `// ... truncated`
/// marker only when truncation actually happened.
fn truncate_to_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }
    let mut out = lines[..max_lines].join("\n");
    out.push_str("\n// ... truncated");
    out
}

fn hard_truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Replaces every top-level method body with `{ ... }`. Brace-depth based;
/// doesn't account for braces inside string/template literals or comments,
/// which is an accepted approximation for an embedding input (not a
/// correctness-sensitive code path) — see `DESIGN.md`.
fn strip_method_bodies(class_source: &str) -> String {
    let bytes = class_source.as_bytes();
    let mut out = String::with_capacity(class_source.len());
    let mut depth = 0i32;
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '{' => {
                depth += 1;
                out.push(c);
                if depth == 2 {
                    // entering a method body (depth 1 = class body, depth 2 = method body)
                    let mut inner_depth = 1;
                    let mut j = i + 1;
                    while j < bytes.len() && inner_depth > 0 {
                        match bytes[j] as char {
                            '{' => inner_depth += 1,
                            '}' => inner_depth -= 1,
                            _ => {}
                        }
                        j += 1;
                    }
                    out.push_str(" ... ");
                    depth -= 1;
                    i = j;
                    out.push('}');
                    continue;
                }
            }
            '}' => {
                depth -= 1;
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Full initial index: walk the project, index every `.ts`/`.tsx` file not
/// already up to date in the manifest, reusing `discovery.rs` unchanged.
pub async fn full_index(ctx: &IndexContext, manifest: &mut Manifest) -> Result<IndexStats> {
    let discovery = FileDiscovery::new();
    let files = discovery.discover(&ctx.project_root)?;

    let mut total = IndexStats::default();
    for abs_path in files {
        let is_ts = matches!(abs_path.extension().and_then(|e| e.to_str()), Some("ts") | Some("tsx"));
        if !is_ts {
            continue;
        }
        if abs_path.to_string_lossy().ends_with(".d.ts") {
            continue;
        }
        if abs_path.components().any(|c| c.as_os_str() == "node_modules") {
            continue;
        }

        let Ok(metadata) = std::fs::metadata(&abs_path) else { continue };
        let rel = RelPath::from_abs(&ctx.project_root, &abs_path);
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        if let Some(entry) = manifest.files.get(rel.as_str()) {
            if entry.mtime_ms == mtime_ms && entry.size == metadata.len() {
                continue;
            }
        }

        match index_file(&abs_path, ctx).await {
            Ok(stats) => {
                total.nodes_added += stats.nodes_added;
                total.edges_added += stats.edges_added;
                let content_hash = std::fs::read_to_string(&abs_path)
                    .map(|s| sha256_hex(&s))
                    .unwrap_or_default();
                manifest.files.insert(
                    rel.as_str().to_string(),
                    ManifestEntry { mtime_ms, size: metadata.len(), content_hash },
                );
            }
            Err(e) => {
                warn!(file = %rel, error = %e, "skipping file after extractor failure");
            }
        }
    }

    debug!(nodes = total.nodes_added, edges = total.edges_added, "full_index complete");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_to_lines_appends_marker_only_when_needed() {
        let short = "a\nb\nc";
        assert_eq!(truncate_to_lines(short, 50), short);

        let long = (0..60).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let truncated = truncate_to_lines(&long, 50);
        assert!(truncated.ends_with("// ... truncated"));
        assert_eq!(truncated.lines().count(), 51);
    }

    #[test]
    fn strip_method_bodies_collapses_nested_braces() {
        let class = "class Foo {\n  bar() {\n    if (x) { y(); }\n  }\n}";
        let stripped = strip_method_bodies(class);
        assert!(stripped.contains("bar() { ... }"));
        assert!(!stripped.contains("y();"));
    }

    #[test]
    fn hard_truncate_respects_char_boundaries() {
        let text = "héllo world";
        let truncated = hard_truncate_bytes(text, 3);
        assert!(truncated.len() <= 3);
    }
}
