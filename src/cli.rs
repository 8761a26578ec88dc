//! `ts-graph` — a thin CLI for one-shot operations against a project's
//! `.ts-graph-mcp` cache, built directly on the library rather than
//! talking HTTP to a running server.
//!
//! `clap::Parser` + `Subcommand`, `--json` for machine-readable output,
//! errors to stderr with exit code 1, over this crate's own
//! index/query/doctor surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;

use ts_graph_mcp::config::{self, Config};
use ts_graph_mcp::embedding::EmbeddingProvider;
use ts_graph_mcp::formatter::{self, FormatterInput};
use ts_graph_mcp::indexer::{full_index, IndexContext, Manifest};
use ts_graph_mcp::registry::{PackageConfig, ProjectRegistry};
use ts_graph_mcp::resolver::{self, SymbolQuery};
use ts_graph_mcp::search::SearchIndex;
use ts_graph_mcp::store::Store;
use ts_graph_mcp::traversal;

#[derive(Parser)]
#[command(name = "ts-graph")]
#[command(version)]
#[command(about = "One-shot operations against a ts-graph-mcp project cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to the current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Emit JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the project's graph cache
    Index,

    /// Resolve a symbol and print its callers/callees/paths
    Query {
        /// Symbol name to resolve
        symbol: String,

        /// File path to disambiguate the symbol, if needed
        #[arg(long)]
        file: Option<String>,

        /// Direction: callees (default) or callers
        #[arg(long, default_value = "callees")]
        direction: String,
    },

    /// Check the project's config, cache layout, and index health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let root = cli.root.canonicalize().unwrap_or_else(|_| cli.root.clone());

    match run_command(&cli, &root).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if cli.json {
                eprintln!("{}", serde_json::json!({ "ok": false, "error": e.to_string() }));
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

async fn run_command(cli: &Cli, root: &std::path::Path) -> Result<()> {
    match &cli.command {
        Commands::Index => cmd_index(cli, root).await,
        Commands::Query { symbol, file, direction } => cmd_query(cli, root, symbol, file.as_deref(), direction).await,
        Commands::Doctor => cmd_doctor(cli, root),
    }
}

fn open_registry(root: &std::path::Path, config: &Config) -> Arc<ProjectRegistry> {
    let packages: Vec<PackageConfig> = config
        .packages
        .iter()
        .map(|p| PackageConfig { name: p.name.clone(), tsconfig: root.join(&p.tsconfig), root: root.to_path_buf() })
        .collect();
    Arc::new(ProjectRegistry::new(root.to_path_buf(), packages))
}

async fn cmd_index(cli: &Cli, root: &std::path::Path) -> Result<()> {
    let config = Config::load(root).context("failed to load project config")?;
    config::ensure_cache_dirs(root)?;

    let store = Arc::new(Store::open(&config::cache_dir(root)).map_err(|e| anyhow::anyhow!(e))?);
    let registry = open_registry(root, &config);
    let search_index = Arc::new(Mutex::new(SearchIndex::new()));

    // The one-shot CLI doesn't carry the `semantic` feature's model download
    // cost; it indexes lexically only.
    let embedding: Option<Arc<dyn EmbeddingProvider>> = None;

    let ctx = IndexContext {
        project_root: root.to_path_buf(),
        store: store.clone(),
        search_index,
        registry,
        embedding,
        cache: None,
    };

    let manifest_path = config::manifest_path(root);
    let mut manifest = Manifest::load(&manifest_path);
    let stats = full_index(&ctx, &mut manifest).await.context("indexing failed")?;
    manifest.save(&manifest_path).context("failed to persist manifest")?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "nodes_added": stats.nodes_added,
                "edges_added": stats.edges_added,
                "files": manifest.files.len(),
            })
        );
    } else {
        println!(
            "indexed {} files: {} nodes, {} edges",
            manifest.files.len(),
            stats.nodes_added,
            stats.edges_added
        );
    }
    Ok(())
}

async fn cmd_query(cli: &Cli, root: &std::path::Path, symbol: &str, file: Option<&str>, direction: &str) -> Result<()> {
    let store = Arc::new(Store::open(&config::cache_dir(root)).map_err(|e| anyhow::anyhow!(e))?);

    let query = SymbolQuery {
        symbol: symbol.to_string(),
        file: file.map(ts_graph_mcp::ids::RelPath::new),
        module: None,
        package: None,
    };
    let outcome = resolver::resolve(&store, &query).context("symbol resolution failed")?;

    let id = match outcome {
        resolver::ResolveOutcome::Unique { id, .. } => id,
        resolver::ResolveOutcome::Ambiguous { candidates } => {
            anyhow::bail!("ambiguous symbol {symbol:?}: {} candidates ({})", candidates.len(), join_ids(&candidates));
        }
        resolver::ResolveOutcome::NotFound { suggestions } => {
            anyhow::bail!("symbol {symbol:?} not found; did you mean: {}", suggestions.join(", "));
        }
    };

    let result = match direction {
        "callers" => traversal::callers(&store, &id, traversal::DEFAULT_MAX_DEPTH)?,
        _ => traversal::callees(&store, &id, traversal::DEFAULT_MAX_DEPTH)?,
    };

    let rendered = match result {
        traversal::TraversalResult::Direct(neighbors) => {
            let exclude = std::collections::HashSet::new();
            formatter::format(
                &store,
                root,
                FormatterInput {
                    nodes: &neighbors.nodes,
                    edges: &neighbors.edges,
                    exclude: &exclude,
                    max_nodes: formatter::DEFAULT_MAX_NODES,
                    context_lines: formatter::DEFAULT_CONTEXT_LINES,
                },
            )
            .await?
        }
        traversal::TraversalResult::MethodFallback(entries) => {
            let mut lines = vec!["ambiguous: class has multiple methods, resolve to one of:".to_string()];
            for entry in entries {
                lines.push(format!("  {} (edges: {})", entry.method_id.as_str(), entry.has_edges));
            }
            lines.join("\n")
        }
    };

    if cli.json {
        println!("{}", serde_json::json!({ "ok": true, "result": rendered }));
    } else {
        println!("{rendered}");
    }
    Ok(())
}

fn cmd_doctor(cli: &Cli, root: &std::path::Path) -> Result<()> {
    let mut problems = Vec::new();

    let config = match Config::load(root) {
        Ok(c) => Some(c),
        Err(e) => {
            problems.push(format!("config: {e}"));
            None
        }
    };

    let cache_dir = config::cache_dir(root);
    let cache_exists = cache_dir.exists();
    if !cache_exists {
        problems.push(format!("cache directory {} does not exist — run `ts-graph index`", cache_dir.display()));
    }

    let manifest_files = config.as_ref().map(|_| Manifest::load(&config::manifest_path(root)).files.len());

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "ok": problems.is_empty(),
                "root": root.display().to_string(),
                "cache_dir_exists": cache_exists,
                "manifest_files": manifest_files,
                "problems": problems,
            })
        );
    } else {
        println!("project root: {}", root.display());
        println!("cache directory: {} (exists: {cache_exists})", cache_dir.display());
        if let Some(n) = manifest_files {
            println!("manifest entries: {n}");
        }
        if problems.is_empty() {
            println!("no problems found");
        } else {
            println!("problems:");
            for p in &problems {
                println!("  - {p}");
            }
        }
    }

    Ok(())
}

fn join_ids(ids: &[ts_graph_mcp::NodeId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}
