//! Search-graph orchestrator: composes hybrid search, the symbol resolver
//! and the traversal engine into the single `{topic?, from?, to?,
//! max_nodes?}` graph query.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::ids::{NodeId, RelPath};
use crate::resolver::{self, ResolveOutcome, SymbolQuery};
use crate::search::SearchIndex;
use crate::store::{Direction, SharedStore};
use crate::traversal;
use crate::types::Edge;

/// Minimum fused score a topic-only seed must clear to be kept.
pub const TOPIC_SCORE_THRESHOLD: f32 = 0.05;
/// Cosine-similarity floor for the "topic + endpoint" filtering pass.
pub const TOPIC_FILTER_THRESHOLD: f32 = 0.2;
/// Bridge-node search radius between topic seeds.
const BRIDGE_MAX_DEPTH: u32 = 3;

/// One endpoint of an orchestrator query: either a resolved symbol or a
/// natural-language query to resolve via hybrid search to a single node.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Symbol { symbol: String, file: Option<RelPath> },
    Query(String),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorQuery {
    pub topic: Option<String>,
    pub from: Option<Endpoint>,
    pub to: Option<Endpoint>,
    pub max_nodes: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchGraph {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

pub struct Orchestrator {
    store: SharedStore,
    search_index: Arc<Mutex<SearchIndex>>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
}

impl Orchestrator {
    pub fn new(
        store: SharedStore,
        search_index: Arc<Mutex<SearchIndex>>,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Orchestrator { store, search_index, embedding }
    }

    /// Resolves a query/symbol endpoint to a single `NodeId`, surfacing
    /// `Ambiguous`/`NotFound` as errors (the HTTP layer renders the
    /// resolver's own richer messages for direct resolve calls; the
    /// orchestrator only needs a single winner to seed traversal).
    async fn resolve_endpoint(&self, endpoint: &Endpoint) -> Result<NodeId> {
        match endpoint {
            Endpoint::Symbol { symbol, file } => {
                let query = SymbolQuery { symbol: symbol.clone(), file: file.clone(), module: None, package: None };
                match resolver::resolve(&self.store, &query)? {
                    ResolveOutcome::Unique { id, .. } => Ok(id),
                    ResolveOutcome::Ambiguous { candidates } => {
                        Err(anyhow!("`{symbol}` is ambiguous ({} candidates)", candidates.len()))
                    }
                    ResolveOutcome::NotFound { suggestions } => {
                        Err(anyhow!("`{symbol}` not found (did you mean: {})", suggestions.join(", ")))
                    }
                }
            }
            Endpoint::Query(text) => {
                let vector = self.embed_query(text).await?;
                let hits = self.search_index.lock().search(text, vector.as_deref(), 1);
                hits.into_iter()
                    .next()
                    .map(|h| h.id)
                    .ok_or_else(|| anyhow!("no node matched query `{text}`"))
            }
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>> {
        match &self.embedding {
            Some(provider) => Ok(Some(provider.embed_query(text).await?)),
            None => Ok(None),
        }
    }

    pub async fn run(&self, query: OrchestratorQuery) -> Result<SearchGraph> {
        let max_nodes = query.max_nodes.unwrap_or(50);
        let OrchestratorQuery { topic, from, to, .. } = query;

        match (from, to) {
            (Some(from), Some(to)) => {
                let from_id = self.resolve_endpoint(&from).await?;
                let to_id = self.resolve_endpoint(&to).await?;
                let paths = traversal::paths_between(
                    &self.store,
                    &from_id,
                    &to_id,
                    traversal::DEFAULT_PATH_MAX_DEPTH,
                    traversal::DEFAULT_MAX_PATHS,
                )?;
                let mut nodes: Vec<NodeId> = paths.into_iter().flat_map(|p| p.nodes).collect();
                dedup_preserve_order(&mut nodes);
                let graph = self.subgraph_for(nodes)?;
                match topic {
                    Some(t) => self.filter_by_topic(graph, &t, &[from_id, to_id]).await,
                    None => Ok(graph),
                }
            }
            (Some(from), None) => {
                let id = self.resolve_endpoint(&from).await?;
                let graph = self.traversal_subgraph(&id, Direction::Out)?;
                match topic {
                    Some(t) => self.filter_by_topic(graph, &t, &[id]).await,
                    None => Ok(graph),
                }
            }
            (None, Some(to)) => {
                let id = self.resolve_endpoint(&to).await?;
                let graph = self.traversal_subgraph(&id, Direction::In)?;
                match topic {
                    Some(t) => self.filter_by_topic(graph, &t, &[id]).await,
                    None => Ok(graph),
                }
            }
            (None, None) => match topic {
                Some(t) => self.topic_only(&t, max_nodes).await,
                None => Err(anyhow!("search-graph query needs at least one of topic/from/to")),
            },
        }
    }

    /// Topic-only: hybrid search seeds plus bridge nodes on a shortest path
    /// (length ≤ 3) between any two seeds.
    async fn topic_only(&self, topic: &str, max_nodes: u32) -> Result<SearchGraph> {
        let vector = self.embed_query(topic).await?;
        let hits = self.search_index.lock().search(topic, vector.as_deref(), max_nodes as usize);
        let seeds: Vec<NodeId> = hits.into_iter().filter(|h| h.score >= TOPIC_SCORE_THRESHOLD).map(|h| h.id).collect();

        let mut nodes: Vec<NodeId> = seeds.clone();
        for i in 0..seeds.len() {
            for j in (i + 1)..seeds.len() {
                if nodes.len() >= max_nodes as usize {
                    break;
                }
                let path = traversal::shortest_paths(&self.store, &seeds[i], &seeds[j], BRIDGE_MAX_DEPTH, 1)?;
                if let Some(p) = path.into_iter().next() {
                    nodes.extend(p.nodes);
                }
            }
        }
        dedup_preserve_order(&mut nodes);
        self.subgraph_for(nodes)
    }

    fn traversal_subgraph(&self, id: &NodeId, direction: Direction) -> Result<SearchGraph> {
        let result = traversal::neighbors(&self.store, id, traversal::DEFAULT_MAX_DEPTH, direction, None)?;
        self.subgraph_for(result.nodes)
    }

    /// Builds the full subgraph for `nodes` — deliberately does not truncate
    /// to `max_nodes` here; the formatter is the single place that applies
    /// the caller's node-count limit, so it can tell the difference between
    /// "all reachable nodes fit" and "truncated" and render accordingly.
    fn subgraph_for(&self, mut nodes: Vec<NodeId>) -> Result<SearchGraph> {
        dedup_preserve_order(&mut nodes);
        let edges = self.store.query_edges_between(&nodes)?;
        Ok(SearchGraph { nodes, edges })
    }

    /// Drops nodes whose embedding-to-topic similarity falls below
    /// [`TOPIC_FILTER_THRESHOLD`], except the query's own endpoints.
    async fn filter_by_topic(&self, graph: SearchGraph, topic: &str, keep: &[NodeId]) -> Result<SearchGraph> {
        let Some(vector) = self.embed_query(topic).await? else { return Ok(graph) };
        let keep_set: HashSet<&NodeId> = keep.iter().collect();
        let search_index = self.search_index.lock();
        let similarity = |id: &NodeId| search_index.vector_similarity(id, &vector);

        let kept_nodes: Vec<NodeId> = graph
            .nodes
            .into_iter()
            .filter(|id| keep_set.contains(id) || similarity(id).map(|s| s >= TOPIC_FILTER_THRESHOLD).unwrap_or(true))
            .collect();
        drop(search_index);

        let kept_set: HashSet<&NodeId> = kept_nodes.iter().collect();
        let edges = graph
            .edges
            .into_iter()
            .filter(|e| kept_set.contains(&e.source) && kept_set.contains(&e.target))
            .collect();

        Ok(SearchGraph { nodes: kept_nodes, edges })
    }
}

fn dedup_preserve_order(nodes: &mut Vec<NodeId>) {
    let mut seen = HashSet::new();
    nodes.retain(|id| seen.insert(id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RelPath;
    use crate::types::{Node, NodeProps, NodeType};

    fn node(file: &str, name: &str) -> Node {
        let rel = RelPath::new(file);
        Node {
            id: NodeId::new(&rel, NodeType::Function, name),
            node_type: NodeType::Function,
            name: name.to_string(),
            package: String::new(),
            file_path: rel,
            start_line: 1,
            end_line: 2,
            exported: true,
            content_hash: "x".into(),
            snippet: String::new(),
            props: NodeProps::default(),
        }
    }

    #[tokio::test]
    async fn from_only_traverses_outgoing() {
        let store: SharedStore = Arc::new(crate::store::Store::open_in_memory().unwrap());
        let a = node("src/a.ts", "foo");
        let b = node("src/a.ts", "bar");
        store.add_nodes(&[a.clone(), b.clone()]).unwrap();
        store
            .add_edges(&[crate::types::Edge {
                source: a.id.clone(),
                target: b.id.clone(),
                edge_type: crate::types::EdgeType::Calls,
                meta: crate::types::EdgeMeta::default(),
            }])
            .unwrap();

        let search_index = Arc::new(Mutex::new(SearchIndex::new()));
        let orchestrator = Orchestrator::new(store, search_index, None);
        let query = OrchestratorQuery {
            topic: None,
            from: Some(Endpoint::Symbol { symbol: "foo".into(), file: Some(RelPath::new("src/a.ts")) }),
            to: None,
            max_nodes: None,
        };
        let graph = orchestrator.run(query).await.unwrap();
        assert!(graph.nodes.contains(&b.id));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let store: SharedStore = Arc::new(crate::store::Store::open_in_memory().unwrap());
        let search_index = Arc::new(Mutex::new(SearchIndex::new()));
        let orchestrator = Orchestrator::new(store, search_index, None);
        assert!(orchestrator.run(OrchestratorQuery::default()).await.is_err());
    }
}
