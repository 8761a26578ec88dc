//! Canonical node identifiers and path utilities.
//!
//! A [`NodeId`] is the only string format the rest of the crate is allowed
//! to parse; everywhere else it is passed around opaquely.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::types::NodeType;

/// A project-root-relative, forward-slash-normalized path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct RelPath(String);

impl RelPath {
    pub fn new(s: impl Into<String>) -> Self {
        RelPath(s.into().replace('\\', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a project-relative path from an absolute path and a project root.
    pub fn from_abs(root: &Path, path: &Path) -> Self {
        let rel = path.strip_prefix(root).unwrap_or(path);
        RelPath::new(rel.to_string_lossy().replace('\\', "/"))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelPath {
    fn from(s: &str) -> Self {
        RelPath::new(s)
    }
}

impl AsRef<Path> for RelPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Canonical node identifier: `"{relative_file_path}:{NodeType}:{symbol_path}"`.
///
/// This is the only place in the crate that understands the on-disk format;
/// the symbol resolver is the only other module allowed to construct one
/// from scratch. Everything downstream (store, search index, formatter)
/// treats a `NodeId` as an opaque, orderable key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(file_path: &RelPath, node_type: NodeType, symbol_path: &str) -> Self {
        NodeId(format!("{}:{}:{}", file_path.as_str(), node_type.as_str(), symbol_path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits into `(file_path, node_type, symbol_path)`. Fails on malformed
    /// input rather than silently truncating, since a corrupt NodeId is a
    /// store-integrity bug, not a user error.
    pub fn parse(&self) -> Result<(RelPath, NodeType, &str)> {
        let mut parts = self.0.splitn(3, ':');
        let file = parts.next().unwrap_or_default();
        let ty = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("malformed NodeId (missing type): {}", self.0))?;
        let symbol = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("malformed NodeId (missing symbol path): {}", self.0))?;
        let node_type = NodeType::parse(ty)
            .ok_or_else(|| anyhow::anyhow!("malformed NodeId (unknown type {}): {}", ty, self.0))?;
        Ok((RelPath::new(file), node_type, symbol))
    }

    /// `true` if this id belongs to the given file (used for per-file
    /// atomic replace: "all nodes/edges whose source or target starts with
    /// `{file_path}:`").
    pub fn belongs_to_file(&self, file_path: &RelPath) -> bool {
        self.0.starts_with(file_path.as_str()) && self.0[file_path.as_str().len()..].starts_with(':')
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Walks upward from `start` looking for a project-root marker file
/// (`ts-graph-mcp.config.json` or `tsconfig.json`).
pub fn project_root_from(start: &Path) -> Result<PathBuf> {
    let mut dir = if start.is_file() {
        start.parent().map(Path::to_path_buf)
    } else {
        Some(start.to_path_buf())
    };

    while let Some(d) = dir {
        if d.join("ts-graph-mcp.config.json").exists() || d.join("tsconfig.json").exists() {
            return Ok(d);
        }
        dir = d.parent().map(Path::to_path_buf);
    }

    bail!("no project root marker found above {}", start.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_node_id() {
        let path = RelPath::new("src/a.ts");
        let id = NodeId::new(&path, NodeType::Method, "User.save");
        assert_eq!(id.as_str(), "src/a.ts:Method:User.save");
        let (file, ty, symbol) = id.parse().unwrap();
        assert_eq!(file.as_str(), "src/a.ts");
        assert_eq!(ty, NodeType::Method);
        assert_eq!(symbol, "User.save");
    }

    #[test]
    fn belongs_to_file_checks_prefix_boundary() {
        let file_a = RelPath::new("src/a.ts");
        let file_ab = RelPath::new("src/ab.ts");
        let id = NodeId::new(&file_ab, NodeType::Function, "foo");
        assert!(!id.belongs_to_file(&file_a), "src/a.ts must not match src/ab.ts:... by naive prefix");
        assert!(id.belongs_to_file(&file_ab));
    }

    #[test]
    fn rejects_malformed_id() {
        let id = NodeId::from("nonsense");
        assert!(id.parse().is_err());
    }
}
