//! Debounced filesystem watch driving incremental reindexing.
//!
//! An mpsc channel feeds raw fs events to a dedicated processing thread
//! that coalesces them in a `HashMap<PathBuf, Instant>` debounce buffer and
//! flushes batches on a `recv_timeout` loop. Supports both native and
//! polling event sources, a `ready()` startup signal, exclude-glob
//! filtering reusing `discovery.rs`'s `GlobSet` idiom, and deletions
//! bypassing debounce entirely so a removed file disappears from the index
//! promptly rather than waiting out the window.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::ids::RelPath;
use crate::indexer::{index_file, sha256_hex, IndexContext, Manifest, ManifestEntry};

/// `ts-graph-mcp.config.json`'s `watch` key.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub debounce_ms: u64,
    pub polling: bool,
    pub polling_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            include: Vec::new(),
            exclude: Vec::new(),
            debounce_ms: 200,
            polling: false,
            polling_interval_ms: 1000,
        }
    }
}

enum AnyWatcher {
    Native(RecommendedWatcher),
    Polling(PollWatcher),
}

impl AnyWatcher {
    fn watch(&mut self, path: &Path, mode: RecursiveMode) -> notify::Result<()> {
        match self {
            AnyWatcher::Native(w) => w.watch(path, mode),
            AnyWatcher::Polling(w) => w.watch(path, mode),
        }
    }
}

enum WatchMsg {
    Fs(Event),
    Shutdown,
}

/// Handle to a running watcher. Dropping it without calling [`close`] leaks
/// the background thread (it blocks forever on `recv`); always call
/// `close()` during shutdown.
///
/// [`close`]: FileWatcher::close
pub struct FileWatcher {
    _watcher: AnyWatcher,
    tx: std_mpsc::Sender<WatchMsg>,
    join_handle: Option<std::thread::JoinHandle<()>>,
    ready_rx: Option<oneshot::Receiver<()>>,
}

impl FileWatcher {
    /// Starts watching `project_root`. `manifest` is the manifest loaded at
    /// startup; the watcher thread owns it exclusively from this point on,
    /// rewriting `manifest_path` atomically after every processed batch.
    pub fn start(
        project_root: PathBuf,
        config: WatchConfig,
        ctx: IndexContext,
        manifest_path: PathBuf,
        manifest: Manifest,
    ) -> Result<FileWatcher> {
        let exclude = build_globset(&config.exclude)?;
        let include = build_globset(&config.include)?;

        let (tx, rx) = std_mpsc::channel::<WatchMsg>();
        let (ready_tx, ready_rx) = oneshot::channel();

        let fs_tx = tx.clone();
        let mut watcher = if config.polling {
            let poll_config =
                notify::Config::default().with_poll_interval(Duration::from_millis(config.polling_interval_ms));
            AnyWatcher::Polling(PollWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = fs_tx.send(WatchMsg::Fs(event));
                    }
                },
                poll_config,
            )?)
        } else {
            AnyWatcher::Native(RecommendedWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = fs_tx.send(WatchMsg::Fs(event));
                    }
                },
                notify::Config::default(),
            )?)
        };

        watcher.watch(&project_root, RecursiveMode::Recursive)?;
        info!(root = %project_root.display(), polling = config.polling, "watcher started");
        // notify/PollWatcher registration is synchronous — there is no
        // separate "initial scan" phase to wait out, so ready fires here.
        let _ = ready_tx.send(());

        let debounce = Duration::from_millis(config.debounce_ms);
        let polling = config.polling;
        let rt_handle = tokio::runtime::Handle::current();
        let join_handle = std::thread::spawn(move || {
            debounce_loop(rx, debounce, polling, project_root, include, exclude, ctx, manifest_path, manifest, rt_handle);
        });

        Ok(FileWatcher { _watcher: watcher, tx, join_handle: Some(join_handle), ready_rx: Some(ready_rx) })
    }

    /// Completes once the event source is ready to observe filesystem
    /// changes. Tests must await this before mutating files.
    pub async fn ready(&mut self) {
        if let Some(rx) = self.ready_rx.take() {
            let _ = rx.await;
        }
    }

    /// Flushes any debounced batch, joins the processing thread, and
    /// releases the underlying file-watcher resources.
    pub fn close(mut self) {
        let _ = self.tx.send(WatchMsg::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn debounce_loop(
    rx: std_mpsc::Receiver<WatchMsg>,
    debounce: Duration,
    polling: bool,
    project_root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    ctx: IndexContext,
    manifest_path: PathBuf,
    mut manifest: Manifest,
    rt_handle: tokio::runtime::Handle,
) {
    let mut pending: std::collections::HashMap<PathBuf, Instant> = std::collections::HashMap::new();

    loop {
        match rx.recv_timeout(debounce) {
            Ok(WatchMsg::Shutdown) => {
                let ready: Vec<PathBuf> = pending.drain().map(|(p, _)| p).collect();
                process_batch(&ready, &project_root, &include, &exclude, &ctx, &manifest_path, &mut manifest, &rt_handle);
                break;
            }
            Ok(WatchMsg::Fs(event)) => {
                let is_delete = matches!(event.kind, EventKind::Remove(_));
                let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_));
                if !relevant {
                    continue;
                }

                if is_delete || polling {
                    // Deletions bypass debounce entirely; polling mode has
                    // no native coalescing to wait out, so process inline.
                    process_batch(&event.paths, &project_root, &include, &exclude, &ctx, &manifest_path, &mut manifest, &rt_handle);
                    continue;
                }

                let now = Instant::now();
                for path in event.paths {
                    pending.insert(path, now);
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let cutoff = Instant::now() - debounce;
                let ready: Vec<PathBuf> = pending.iter().filter(|(_, t)| **t <= cutoff).map(|(p, _)| p.clone()).collect();
                if ready.is_empty() {
                    continue;
                }
                for path in &ready {
                    pending.remove(path);
                }
                process_batch(&ready, &project_root, &include, &exclude, &ctx, &manifest_path, &mut manifest, &rt_handle);
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_batch(
    paths: &[PathBuf],
    project_root: &Path,
    include: &GlobSet,
    exclude: &GlobSet,
    ctx: &IndexContext,
    manifest_path: &Path,
    manifest: &mut Manifest,
    rt_handle: &tokio::runtime::Handle,
) {
    let mut changed = 0usize;
    let mut removed = 0usize;

    for abs_path in paths {
        let rel_pathbuf = match abs_path.strip_prefix(project_root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };

        if !should_process(&rel_pathbuf, include, exclude) {
            continue;
        }

        let rel = RelPath::from_abs(project_root, abs_path);

        if abs_path.exists() {
            if abs_path.is_dir() {
                continue;
            }
            if !ctx.registry.contains(abs_path) {
                debug!(file = %rel, "skipping file outside any configured package");
                continue;
            }
            match rt_handle.block_on(index_file(abs_path, ctx)) {
                Ok(_) => {
                    if let Ok(metadata) = std::fs::metadata(abs_path) {
                        let mtime_ms = metadata
                            .modified()
                            .ok()
                            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                            .map(|d| d.as_millis() as i64)
                            .unwrap_or(0);
                        let content_hash =
                            std::fs::read_to_string(abs_path).map(|s| sha256_hex(&s)).unwrap_or_default();
                        manifest.files.insert(
                            rel.as_str().to_string(),
                            ManifestEntry { mtime_ms, size: metadata.len(), content_hash },
                        );
                    }
                    changed += 1;
                }
                Err(e) => {
                    error!(file = %rel, error = %e, "index_file failed; file left out of sync until next edit");
                }
            }
        } else {
            if let Err(e) = ctx.store.remove_file_nodes(&rel) {
                error!(file = %rel, error = %e, "failed to remove deleted file's nodes");
                continue;
            }
            ctx.search_index.lock().remove_by_file(rel.as_str());
            ctx.registry.unregister_file(&rel);
            manifest.files.remove(rel.as_str());
            removed += 1;
        }
    }

    if changed > 0 || removed > 0 {
        if let Err(e) = manifest.save(manifest_path) {
            warn!(error = %e, "failed to persist manifest after watch batch");
        }
        info!(changed, removed, "watch batch processed");
    }
}

fn should_process(rel: &Path, include: &GlobSet, exclude: &GlobSet) -> bool {
    let is_ts = matches!(rel.extension().and_then(|e| e.to_str()), Some("ts") | Some("tsx"));
    if !is_ts {
        return false;
    }
    if rel.to_string_lossy().ends_with(".d.ts") {
        return false;
    }
    if rel.components().any(|c| c.as_os_str() == "node_modules") {
        return false;
    }
    let is_included = include.is_match(rel);
    let is_excluded = exclude.is_match(rel);
    !is_excluded || is_included
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_process_rejects_declaration_files_and_node_modules() {
        let empty = GlobSetBuilder::new().build().unwrap();
        assert!(should_process(Path::new("src/a.ts"), &empty, &empty));
        assert!(!should_process(Path::new("src/a.d.ts"), &empty, &empty));
        assert!(!should_process(Path::new("node_modules/pkg/index.ts"), &empty, &empty));
        assert!(!should_process(Path::new("src/a.js"), &empty, &empty));
    }

    #[test]
    fn should_process_honors_include_override_of_exclude() {
        let exclude = build_globset(&["generated/**".to_string()]).unwrap();
        let include = build_globset(&["generated/keep.ts".to_string()]).unwrap();
        assert!(!should_process(Path::new("generated/other.ts"), &include, &exclude));
        assert!(should_process(Path::new("generated/keep.ts"), &include, &exclude));
    }
}
