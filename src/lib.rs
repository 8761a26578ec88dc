#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_map)]

//! `ts-graph-mcp`: a persistent code-intelligence service for TypeScript
//! workspaces. It parses `.ts`/`.tsx` source with tree-sitter, extracts a
//! typed symbol/edge graph, and persists it in an embedded SQLite store plus
//! a hybrid lexical/vector search index. A debounced file watcher keeps both
//! in sync with the filesystem; a small HTTP API answers graph queries over
//! the result.
//!
//! # Architecture
//!
//! - [`ids`] / [`types`] — the node/edge graph's stable identifiers and data
//!   model.
//! - [`store`] — the embedded SQLite graph store.
//! - [`embedding_cache`] / [`embedding`] — content-addressed embedding cache
//!   and the async embedding provider trait.
//! - [`search`] — hybrid BM25 + vector search index.
//! - [`extractor`] — tree-sitter-based node/edge extraction.
//! - [`indexer`] — the full/incremental indexing pipeline and progressive-
//!   fallback embedding.
//! - [`registry`] — per-package tsconfig/project cache and cross-file symbol
//!   table.
//! - [`watcher`] — debounced filesystem watcher.
//! - [`resolver`] — symbol-to-`NodeId` resolution.
//! - [`traversal`] — callers/callees/impact/path queries.
//! - [`orchestrator`] — the `searchGraph` query composing search, resolver
//!   and traversal.
//! - [`formatter`] — chain-compacted graph/snippet rendering.
//! - [`config`] — on-disk config and cache-directory layout.
//! - [`api`] — the HTTP API.

pub mod api;
pub mod config;
pub mod discovery;
pub mod embedding;
pub mod embedding_cache;
pub mod extractor;
pub mod formatter;
pub mod ids;
pub mod indexer;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod search;
pub mod store;
pub mod traversal;
pub mod types;
pub mod watcher;

pub use ids::{NodeId, RelPath};
pub use types::{Edge, EdgeType, Node, NodeType};

/// Server name reported by `/health` and used in log output.
pub const SERVER_NAME: &str = "ts-graph-mcp";
/// Server version, from `Cargo.toml`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
