//! HTTP API: localhost-only JSON endpoints over axum, mounted by
//! `src/main.rs`.
//!
//! Handler shape: `State<Ctx>` + `Json<Req>` in,
//! `Result<Json<Resp>, (StatusCode, Json<Value>)>` out, a
//! `read_state`-style lock helper, `Router::new().route(...)` layering,
//! `CorsLayer`/`TraceLayer`, graceful shutdown via a future.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;

use crate::embedding::EmbeddingProvider;
use crate::formatter::{self, FormatterInput};
use crate::ids::{NodeId, RelPath};
use crate::orchestrator::{Endpoint, Orchestrator, OrchestratorQuery};
use crate::resolver::{self, ResolveOutcome, SymbolQuery};
use crate::search::SearchIndex;
use crate::store::SharedStore;
use crate::traversal::{self, TraversalResult};

pub const API_VERSION: u32 = 1;

/// Shared handler state. `ready`/`indexed_files` are updated by the indexer
/// and watcher as they run; handlers only read them.
#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
    pub search_index: Arc<Mutex<SearchIndex>>,
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub project_root: PathBuf,
    pub ready: Arc<AtomicBool>,
    pub indexed_files: Arc<AtomicUsize>,
    pub shutdown: Arc<Notify>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/stop", post(stop))
        .route("/api/dependenciesOf", post(dependencies_of))
        .route("/api/dependentsOf", post(dependents_of))
        .route("/api/pathsBetween", post(paths_between))
        .route("/api/searchGraph", post(search_graph))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "ready": state.ready.load(Ordering::Relaxed),
        "indexed_files": state.indexed_files.load(Ordering::Relaxed),
    }))
}

async fn version() -> impl IntoResponse {
    Json(json!({ "apiVersion": API_VERSION }))
}

async fn stop(State(state): State<ApiState>) -> impl IntoResponse {
    state.shutdown.notify_one();
    Json(json!({ "status": "stopping" }))
}

type ApiErrorBody = (StatusCode, Json<serde_json::Value>);

fn not_ready() -> ApiErrorBody {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "indexing", "message": "index not ready yet" })))
}

fn bad_request(message: impl Into<String>) -> ApiErrorBody {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_input", "message": message.into() })))
}

fn require_ready(state: &ApiState) -> Result<(), ApiErrorBody> {
    if state.ready.load(Ordering::Relaxed) {
        Ok(())
    } else {
        Err(not_ready())
    }
}

#[derive(Debug, Deserialize)]
struct DependencyRequest {
    file_path: Option<String>,
    symbol: String,
}

/// Resolves a `{file_path, symbol}` endpoint to a single [`NodeId`], turning
/// `Ambiguous`/`NotFound` resolver outcomes into structured 409/404 bodies.
fn resolve_symbol(state: &ApiState, endpoint: DependencyRequest) -> Result<NodeId, ApiErrorBody> {
    if endpoint.symbol.trim().is_empty() {
        return Err(bad_request("symbol must not be empty"));
    }
    let query = SymbolQuery {
        symbol: endpoint.symbol,
        file: endpoint.file_path.map(RelPath::new),
        module: None,
        package: None,
    };
    let outcome = resolver::resolve(&state.store, &query)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;
    match outcome {
        ResolveOutcome::Unique { id, .. } => Ok(id),
        ResolveOutcome::Ambiguous { candidates } => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "ambiguous", "candidates": candidates.iter().map(|c| c.as_str()).collect::<Vec<_>>() })),
        )),
        ResolveOutcome::NotFound { suggestions } => {
            Err((StatusCode::NOT_FOUND, Json(json!({ "error": "not_found", "suggestions": suggestions }))))
        }
    }
}

async fn render_traversal(state: &ApiState, result: TraversalResult) -> Result<String, ApiErrorBody> {
    match result {
        TraversalResult::Direct(neighbors) => {
            let exclude = std::collections::HashSet::new();
            formatter::format(
                &state.store,
                &state.project_root,
                FormatterInput {
                    nodes: &neighbors.nodes,
                    edges: &neighbors.edges,
                    exclude: &exclude,
                    max_nodes: formatter::DEFAULT_MAX_NODES,
                    context_lines: formatter::DEFAULT_CONTEXT_LINES,
                },
            )
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))
        }
        TraversalResult::MethodFallback(entries) => {
            let mut lines = vec!["ambiguous: class has multiple methods, resolve to one of:".to_string()];
            for entry in entries {
                lines.push(format!("  {} (edges: {})", entry.method_id.as_str(), entry.has_edges));
            }
            Ok(lines.join("\n"))
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultResponse {
    result: String,
}

async fn dependencies_of(
    State(state): State<ApiState>,
    Json(req): Json<DependencyRequest>,
) -> Result<Json<ResultResponse>, ApiErrorBody> {
    require_ready(&state)?;
    let id = resolve_symbol(&state, req)?;
    let result = traversal::callees(&state.store, &id, traversal::DEFAULT_MAX_DEPTH)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;
    Ok(Json(ResultResponse { result: render_traversal(&state, result).await? }))
}

async fn dependents_of(
    State(state): State<ApiState>,
    Json(req): Json<DependencyRequest>,
) -> Result<Json<ResultResponse>, ApiErrorBody> {
    require_ready(&state)?;
    let id = resolve_symbol(&state, req)?;
    let result = traversal::callers(&state.store, &id, traversal::DEFAULT_MAX_DEPTH)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;
    Ok(Json(ResultResponse { result: render_traversal(&state, result).await? }))
}

#[derive(Debug, Deserialize)]
struct PathsBetweenRequest {
    from: DependencyRequest,
    to: DependencyRequest,
}

async fn paths_between(
    State(state): State<ApiState>,
    Json(req): Json<PathsBetweenRequest>,
) -> Result<Json<ResultResponse>, ApiErrorBody> {
    require_ready(&state)?;
    let from_id = resolve_symbol(&state, req.from)?;
    let to_id = resolve_symbol(&state, req.to)?;
    if from_id == to_id {
        return Err(bad_request("from and to must name different symbols"));
    }

    let paths = traversal::paths_between(&state.store, &from_id, &to_id, traversal::DEFAULT_PATH_MAX_DEPTH, traversal::DEFAULT_MAX_PATHS)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;

    let mut nodes: Vec<NodeId> = paths.into_iter().flat_map(|p| p.nodes).collect();
    let mut seen = std::collections::HashSet::new();
    nodes.retain(|id| seen.insert(id.clone()));
    let edges = state
        .store
        .query_edges_between(&nodes)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;

    let exclude = std::collections::HashSet::new();
    let result = formatter::format(
        &state.store,
        &state.project_root,
        FormatterInput { nodes: &nodes, edges: &edges, exclude: &exclude, max_nodes: formatter::DEFAULT_MAX_NODES, context_lines: formatter::DEFAULT_CONTEXT_LINES },
    )
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;

    Ok(Json(ResultResponse { result }))
}

#[derive(Debug, Deserialize)]
struct SearchGraphRequest {
    topic: Option<String>,
    from: Option<DependencyRequest>,
    to: Option<DependencyRequest>,
    max_nodes: Option<u32>,
}

fn to_endpoint(req: DependencyRequest) -> Endpoint {
    Endpoint::Symbol { symbol: req.symbol, file: req.file_path.map(RelPath::new) }
}

async fn search_graph(
    State(state): State<ApiState>,
    Json(req): Json<SearchGraphRequest>,
) -> Result<Json<ResultResponse>, ApiErrorBody> {
    require_ready(&state)?;
    if req.topic.is_none() && req.from.is_none() && req.to.is_none() {
        return Err(bad_request("searchGraph needs at least one of topic/from/to"));
    }

    let orchestrator = Orchestrator::new(state.store.clone(), state.search_index.clone(), state.embedding.clone());
    let query = OrchestratorQuery {
        topic: req.topic,
        from: req.from.map(to_endpoint),
        to: req.to.map(to_endpoint),
        max_nodes: req.max_nodes,
    };
    let graph = orchestrator
        .run(query)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    let max_nodes = req.max_nodes.map(|n| n as usize).unwrap_or(formatter::DEFAULT_MAX_NODES);
    let exclude = std::collections::HashSet::new();
    let result = formatter::format(
        &state.store,
        &state.project_root,
        FormatterInput {
            nodes: &graph.nodes,
            edges: &graph.edges,
            exclude: &exclude,
            max_nodes,
            context_lines: formatter::DEFAULT_CONTEXT_LINES,
        },
    )
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal", "message": e.to_string() }))))?;

    Ok(Json(ResultResponse { result }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ready_flag_and_count() {
        let store: SharedStore = Arc::new(crate::store::Store::open_in_memory().unwrap());
        let state = ApiState {
            store,
            search_index: Arc::new(Mutex::new(SearchIndex::new())),
            embedding: None,
            project_root: PathBuf::from("."),
            ready: Arc::new(AtomicBool::new(true)),
            indexed_files: Arc::new(AtomicUsize::new(3)),
            shutdown: Arc::new(Notify::new()),
        };
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dependencies_of_rejects_when_not_ready() {
        let store: SharedStore = Arc::new(crate::store::Store::open_in_memory().unwrap());
        let state = ApiState {
            store,
            search_index: Arc::new(Mutex::new(SearchIndex::new())),
            embedding: None,
            project_root: PathBuf::from("."),
            ready: Arc::new(AtomicBool::new(false)),
            indexed_files: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(Notify::new()),
        };
        let result = dependencies_of(State(state), Json(DependencyRequest { file_path: None, symbol: "foo".into() })).await;
        assert!(result.is_err());
    }
}
