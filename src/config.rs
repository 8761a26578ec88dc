//! On-disk config: `ts-graph-mcp.config.json`, the
//! `<project_root>/.ts-graph-mcp/` cache layout, and the package-list/watch
//! knobs that feed the registry, indexer and watcher.
//!
//! `CACHE_DIR`/`MANIFEST_FILE` constants, `fs::read` + `serde_json::from_slice`
//! loading style.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "ts-graph-mcp.config.json";
pub const CACHE_DIR: &str = ".ts-graph-mcp";
pub const SQLITE_DIR: &str = "sqlite";
pub const SQLITE_FILE: &str = "graph.db";
pub const SEARCH_INDEX_FILE: &str = "orama/index.json";
pub const EMBEDDING_CACHE_DIR: &str = "embedding-cache";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SERVER_FILE: &str = "server.json";
pub const SPAWN_LOCK_FILE: &str = "spawn.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub tsconfig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSection {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_debounce")]
    pub debounce: u64,
    #[serde(default)]
    pub polling: bool,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
}

fn default_debounce() -> u64 {
    200
}

fn default_polling_interval() -> u64 {
    1000
}

impl Default for WatchSection {
    fn default() -> Self {
        WatchSection {
            include: Vec::new(),
            exclude: Vec::new(),
            debounce: default_debounce(),
            polling: false,
            polling_interval: default_polling_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub packages: Vec<PackageSpec>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub watch: WatchSection,
}

impl Config {
    /// Loads `ts-graph-mcp.config.json` from `root`, falling back to an
    /// auto-detected `tsconfig.json` (single implicit package) if no config
    /// file exists. Returns `Err` (exit code 2) on a present-but-invalid
    /// config file.
    pub fn load(root: &Path) -> Result<Config> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            return Self::load_file(&config_path);
        }

        let tsconfig_path = root.join("tsconfig.json");
        if tsconfig_path.exists() {
            return Ok(Config::single_implicit_package("tsconfig.json"));
        }

        bail!(
            "no {CONFIG_FILE} and no tsconfig.json found under {}",
            root.display()
        );
    }

    /// A bare `{"packages": [...]}` file ("An input form with a bare
    /// `packages` key is accepted and normalized to a single implicit
    /// module") deserializes here too, since `storage`/`watch` both default.
    fn load_file(path: &Path) -> Result<Config> {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("invalid config at {}", path.display()))
    }

    fn single_implicit_package(tsconfig: &str) -> Config {
        Config {
            packages: vec![PackageSpec { name: "root".to_string(), tsconfig: tsconfig.to_string() }],
            storage: StorageConfig::default(),
            watch: WatchSection::default(),
        }
    }
}

pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

pub fn sqlite_path(root: &Path) -> PathBuf {
    cache_dir(root).join(SQLITE_DIR).join(SQLITE_FILE)
}

pub fn search_index_path(root: &Path) -> PathBuf {
    cache_dir(root).join(SEARCH_INDEX_FILE)
}

pub fn embedding_cache_path(root: &Path, model_name: &str) -> PathBuf {
    cache_dir(root).join(EMBEDDING_CACHE_DIR).join(format!("{model_name}.db"))
}

pub fn manifest_path(root: &Path) -> PathBuf {
    cache_dir(root).join(MANIFEST_FILE)
}

pub fn server_file_path(root: &Path) -> PathBuf {
    cache_dir(root).join(SERVER_FILE)
}

pub fn spawn_lock_path(root: &Path) -> PathBuf {
    cache_dir(root).join(SPAWN_LOCK_FILE)
}

/// Creates every directory the cache layout needs ahead of first write.
pub fn ensure_cache_dirs(root: &Path) -> Result<()> {
    let base = cache_dir(root);
    fs::create_dir_all(base.join(SQLITE_DIR))?;
    fs::create_dir_all(base.join(EMBEDDING_CACHE_DIR))?;
    fs::create_dir_all(base.join("orama"))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub pid: u32,
    pub port: u16,
    pub host: String,
    pub started_at: String,
    pub project_root: String,
    pub ready: bool,
}

impl ServerInfo {
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = server_file_path(root);
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn remove(root: &Path) -> Result<()> {
        let path = server_file_path(root);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_packages_form_normalizes() {
        let config: Config = serde_json::from_str(r#"{"packages":[{"name":"a","tsconfig":"./tsconfig.json"}]}"#).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].name, "a");
        assert_eq!(config.watch.debounce, default_debounce());
    }

    #[test]
    fn full_form_keeps_watch_and_storage() {
        let json = r#"{
            "packages": [{"name": "a", "tsconfig": "./tsconfig.json"}],
            "storage": {"type": "sqlite", "path": "custom.db"},
            "watch": {"debounce": 500, "polling": true}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.storage.kind.as_deref(), Some("sqlite"));
        assert_eq!(config.watch.debounce, 500);
        assert!(config.watch.polling);
    }

    #[test]
    fn missing_config_and_tsconfig_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn tsconfig_auto_detect_yields_single_package() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].tsconfig, "tsconfig.json");
    }
}
