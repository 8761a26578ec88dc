//! `ts-graph-mcp` server binary: loads the project config, builds the
//! graph store / search index / registry, runs a full index pass, starts
//! the file watcher, and serves the HTTP API on localhost.
//!
//! Binds an explicit `PORT` env var first, else auto-scans a fixed port
//! range; `shutdown_signal()` combines ctrl-c and SIGTERM;
//! `axum::serve(..).with_graceful_shutdown` drives the actual shutdown.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, info};

use ts_graph_mcp::api::{self, ApiState};
use ts_graph_mcp::config::{self, Config, ServerInfo};
use ts_graph_mcp::embedding::EmbeddingProvider;
use ts_graph_mcp::embedding_cache::EmbeddingCache;
use ts_graph_mcp::indexer::{full_index, IndexContext, Manifest};
use ts_graph_mcp::registry::{PackageConfig, ProjectRegistry};
use ts_graph_mcp::search::SearchIndex;
use ts_graph_mcp::store::Store;
use ts_graph_mcp::{SERVER_NAME, SERVER_VERSION};

const PORT_RANGE_BASE: u16 = 8732;
const PORT_RANGE_LEN: u16 = 10;
const EMBEDDING_DIMS: usize = 384;
const EMBEDDING_MAX_CONTEXT: usize = 8192;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("ts_graph_mcp=info".parse().unwrap()),
        )
        .init();
}

fn project_root() -> PathBuf {
    std::env::var("TS_GRAPH_MCP_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[tokio::main]
async fn main() {
    init_logging();
    let root = project_root();

    let config = match Config::load(&root) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid or missing configuration");
            std::process::exit(2);
        }
    };

    match run(root, config).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "fatal startup error");
            std::process::exit(1);
        }
    }
}

async fn run(root: PathBuf, config: Config) -> Result<()> {
    info!("starting {} v{}", SERVER_NAME, SERVER_VERSION);
    info!(root = %root.display(), "project root");

    config::ensure_cache_dirs(&root).context("failed to prepare cache directory layout")?;
    let cache_dir = config::cache_dir(&root);

    let store = Arc::new(Store::open(&cache_dir).map_err(|e| anyhow::anyhow!(e))?);

    let packages: Vec<PackageConfig> = config
        .packages
        .iter()
        .map(|p| PackageConfig { name: p.name.clone(), tsconfig: root.join(&p.tsconfig), root: root.clone() })
        .collect();
    let registry = Arc::new(ProjectRegistry::new(root.clone(), packages));

    let embedding: Option<Arc<dyn EmbeddingProvider>> = build_embedding_provider();
    let cache = match &embedding {
        Some(_) => {
            let model_name = embedding_model_name();
            Some(Arc::new(Mutex::new(
                EmbeddingCache::open(&cache_dir, &model_name, EMBEDDING_DIMS).context("failed to open embedding cache")?,
            )))
        }
        None => None,
    };

    if let Some(provider) = &embedding {
        provider.initialize().await.context("failed to initialize embedding provider")?;
    }

    let search_index = Arc::new(Mutex::new(SearchIndex::new()));

    let ctx = IndexContext {
        project_root: root.clone(),
        store: store.clone(),
        search_index: search_index.clone(),
        registry: registry.clone(),
        embedding: embedding.clone(),
        cache,
    };

    let manifest_path = config::manifest_path(&root);
    let mut manifest = Manifest::load(&manifest_path);

    let ready = Arc::new(AtomicBool::new(false));
    let indexed_files = Arc::new(AtomicUsize::new(0));

    let stats = full_index(&ctx, &mut manifest).await.context("initial indexing failed")?;
    manifest.save(&manifest_path).context("failed to persist manifest after initial index")?;
    indexed_files.store(manifest.files.len(), Ordering::Relaxed);
    ready.store(true, Ordering::Relaxed);
    info!(nodes = stats.nodes_added, edges = stats.edges_added, files = manifest.files.len(), "initial index complete");

    let watch_config = ts_graph_mcp::watcher::WatchConfig {
        include: config.watch.include.clone(),
        exclude: config.watch.exclude.clone(),
        debounce_ms: config.watch.debounce,
        polling: config.watch.polling,
        polling_interval_ms: config.watch.polling_interval,
    };
    let mut watcher = ts_graph_mcp::watcher::FileWatcher::start(root.clone(), watch_config, ctx, manifest_path, manifest)
        .context("failed to start file watcher")?;
    watcher.ready().await;

    let shutdown = Arc::new(Notify::new());
    let state = ApiState {
        store: store.clone(),
        search_index: search_index.clone(),
        embedding: embedding.clone(),
        project_root: root.clone(),
        ready: ready.clone(),
        indexed_files: indexed_files.clone(),
        shutdown: shutdown.clone(),
    };

    let app = api::router(state);
    let bind_host = "127.0.0.1";
    let listener = bind_listener(bind_host).await.context("no free port found")?;
    let port = listener.local_addr()?.port();

    let server_info = ServerInfo {
        pid: std::process::id(),
        port,
        host: bind_host.to_string(),
        started_at: now_rfc3339(),
        project_root: root.display().to_string(),
        ready: true,
    };
    server_info.save(&root).context("failed to write server.json")?;
    eprintln!("TS_GRAPH_MCP_PORT={port}");
    info!(port, "http://{bind_host}:{port}");

    let result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown)).await;

    if let Some(provider) = &embedding {
        let _ = provider.dispose().await;
    }
    watcher.close();
    ServerInfo::remove(&root).context("failed to remove server.json on shutdown")?;

    result.context("http server error")
}

async fn bind_listener(host: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(Ok(port)) = std::env::var("PORT").map(|p| p.parse::<u16>()) {
        return tokio::net::TcpListener::bind(format!("{host}:{port}"))
            .await
            .with_context(|| format!("PORT={port} was set explicitly but could not be bound"));
    }

    for port in PORT_RANGE_BASE..PORT_RANGE_BASE + PORT_RANGE_LEN {
        if let Ok(listener) = tokio::net::TcpListener::bind(format!("{host}:{port}")).await {
            return Ok(listener);
        }
    }
    anyhow::bail!("no free port in {PORT_RANGE_BASE}..{}", PORT_RANGE_BASE + PORT_RANGE_LEN - 1);
}

/// Waits on ctrl-c, SIGTERM (unix), or the `/stop` endpoint's notification.
async fn shutdown_signal(stop: Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = stop.notified() => info!("received /stop request, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = stop.notified() => info!("received /stop request, shutting down"),
        }
    }
}

fn embedding_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

#[cfg(feature = "semantic")]
fn build_embedding_provider() -> Option<Arc<dyn EmbeddingProvider>> {
    use ts_graph_mcp::embedding::fastembed_provider::FastEmbedProvider;
    Some(Arc::new(FastEmbedProvider::new(EMBEDDING_MAX_CONTEXT)))
}

#[cfg(not(feature = "semantic"))]
fn build_embedding_provider() -> Option<Arc<dyn EmbeddingProvider>> {
    None
}

/// Minimal UTC RFC-3339 formatter (seconds precision) so `server.json`'s
/// `started_at` doesn't need a date/time crate beyond what `std` gives us.
fn now_rfc3339() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let days = secs.div_euclid(86_400);
    let time_of_day = secs.rem_euclid(86_400);
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);

    // Howard Hinnant's civil_from_days algorithm.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}
