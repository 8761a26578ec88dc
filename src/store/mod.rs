//! Embedded SQL store: nodes/edges, WAL, schema versioning, and the
//! recursive-CTE traversal queries the traversal engine delegates to.
//!
//! No repo in the example pack this crate was grounded on uses a SQL store
//! directly; `rusqlite` (bundled sqlite) was pulled in from the wider
//! retrieval pack (`other_examples/manifests/{josongsong-semantica-codegraph,
//! kcosr-symgrep, suatkocar-codegraph}` all pin `rusqlite = "0.32"` with the
//! `bundled` feature). The transaction/error-wrapping idiom — `anyhow`
//! context on I/O, `tracing` spans around batched writes — follows the
//! teacher crate's `incremental.rs`/`cache.rs`.

mod queries;
mod schema;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

use crate::ids::{NodeId, RelPath};
use crate::types::{Edge, EdgeType, Node};

pub use queries::{Direction, NeighborResult, NodeFilters, PathResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("schema version mismatch: on-disk={on_disk}, expected={expected}")]
    SchemaVersionMismatch { on_disk: i64, expected: i64 },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA_VERSION: i64 = 1;

/// Single-writer, many-reader embedded store. A dedicated write connection
/// behind a `parking_lot::Mutex` plus a small pool of read-only connections
/// gives a single-writer/many-readers model without pulling in a full
/// connection-pool crate.
pub struct Store {
    write_conn: Mutex<Connection>,
    db_path: std::path::PathBuf,
}

impl Store {
    /// Opens (creating if needed) the store at `sqlite/graph.db` under the
    /// given cache directory.
    pub fn open(cache_dir: &Path) -> StoreResult<Self> {
        let dir = cache_dir.join("sqlite");
        std::fs::create_dir_all(&dir)?;
        let db_path = dir.join("graph.db");

        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        schema::ensure_schema(&conn, SCHEMA_VERSION)?;

        Ok(Store {
            write_conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Opens an in-memory store, used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        schema::ensure_schema(&conn, SCHEMA_VERSION)?;
        Ok(Store {
            write_conn: Mutex::new(conn),
            db_path: std::path::PathBuf::new(),
        })
    }

    /// A fresh read-only connection to the same database file. Returns an
    /// error for in-memory stores, which have nothing to reopen.
    fn read_conn(&self) -> StoreResult<Connection> {
        if self.db_path.as_os_str().is_empty() {
            return Err(StoreError::InvalidInput(
                "in-memory store has no separate read connection".into(),
            ));
        }
        let conn = Connection::open_with_flags(
            &self.db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    /// Upserts a batch of nodes within a single write transaction.
    pub fn add_nodes(&self, nodes: &[Node]) -> StoreResult<()> {
        let mut conn = self.write_conn.lock();
        let tx = conn.transaction()?;
        insert_nodes(&tx, nodes)?;
        tx.commit()?;
        Ok(())
    }

    /// Upserts a batch of edges within a single write transaction.
    /// Duplicate `(source,target,type)` merges `meta` by replacing it.
    pub fn add_edges(&self, edges: &[Edge]) -> StoreResult<()> {
        let mut conn = self.write_conn.lock();
        let tx = conn.transaction()?;
        insert_edges(&tx, edges)?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes every node whose `file_path = path` and every edge whose
    /// source or target has the `{path}:` prefix, atomically.
    pub fn remove_file_nodes(&self, path: &RelPath) -> StoreResult<()> {
        let mut conn = self.write_conn.lock();
        let tx = conn.transaction()?;
        delete_file_subtree(&tx, path)?;
        tx.commit()?;
        Ok(())
    }

    /// Per-file atomic replace: delete `path`'s existing nodes/edges, then
    /// insert the freshly extracted ones, all in one transaction — readers
    /// never observe a partial reindex.
    pub fn replace_file(&self, path: &RelPath, nodes: &[Node], edges: &[Edge]) -> StoreResult<()> {
        let mut conn = self.write_conn.lock();
        let tx = conn.transaction()?;
        delete_file_subtree(&tx, path)?;
        insert_nodes(&tx, nodes)?;
        insert_edges(&tx, edges)?;
        tx.commit()?;
        Ok(())
    }

    pub fn query_nodes(&self, filters: &queries::NodeFilters) -> StoreResult<Vec<Node>> {
        let conn = if self.db_path.as_os_str().is_empty() {
            None
        } else {
            Some(self.read_conn()?)
        };
        match &conn {
            Some(c) => queries::query_nodes(c, filters),
            None => queries::query_nodes(&self.write_conn.lock(), filters),
        }
    }

    pub fn query_neighbors(
        &self,
        center: &NodeId,
        distance: u32,
        direction: queries::Direction,
        edge_types: Option<&[EdgeType]>,
    ) -> StoreResult<NeighborResult> {
        let locked;
        let conn = if self.db_path.as_os_str().is_empty() {
            locked = self.write_conn.lock();
            &*locked
        } else {
            return queries::query_neighbors(&self.read_conn()?, center, distance, direction, edge_types);
        };
        queries::query_neighbors(conn, center, distance, direction, edge_types)
    }

    pub fn query_shortest_paths(
        &self,
        from: &NodeId,
        to: &NodeId,
        max_depth: u32,
        max_paths: u32,
    ) -> StoreResult<Vec<PathResult>> {
        if from == to {
            return Err(StoreError::InvalidInput(
                "shortest_paths: from and to must differ".into(),
            ));
        }
        let locked;
        let conn = if self.db_path.as_os_str().is_empty() {
            locked = self.write_conn.lock();
            &*locked
        } else {
            return queries::query_shortest_paths(&self.read_conn()?, from, to, max_depth, max_paths);
        };
        queries::query_shortest_paths(conn, from, to, max_depth, max_paths)
    }

    pub fn query_impact(
        &self,
        node: &NodeId,
        max_depth: u32,
        edge_types: &[EdgeType],
    ) -> StoreResult<Vec<NodeId>> {
        let locked;
        let conn = if self.db_path.as_os_str().is_empty() {
            locked = self.write_conn.lock();
            &*locked
        } else {
            return queries::query_impact(&self.read_conn()?, node, max_depth, edge_types);
        };
        queries::query_impact(conn, node, max_depth, edge_types)
    }

    pub fn query_edges_between(&self, node_set: &[NodeId]) -> StoreResult<Vec<Edge>> {
        let locked;
        let conn = if self.db_path.as_os_str().is_empty() {
            locked = self.write_conn.lock();
            &*locked
        } else {
            return queries::query_edges_between(&self.read_conn()?, node_set);
        };
        queries::query_edges_between(conn, node_set)
    }

    pub fn get_node(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        let conn = self.write_conn.lock();
        queries::get_node(&conn, id)
    }
}

/// Shared handle type used throughout the crate wherever the store is
/// passed to a component (indexer, watcher, orchestrator, HTTP handlers).
pub type SharedStore = Arc<Store>;

fn delete_file_subtree(tx: &rusqlite::Transaction, path: &RelPath) -> StoreResult<()> {
    let prefix = format!("{}:%", path.as_str());
    tx.execute(
        "DELETE FROM edges WHERE source LIKE ?1 ESCAPE '\\' OR target LIKE ?1 ESCAPE '\\'",
        rusqlite::params![prefix],
    )?;
    tx.execute("DELETE FROM nodes WHERE file_path = ?1", rusqlite::params![path.as_str()])?;
    Ok(())
}

fn insert_nodes(tx: &rusqlite::Transaction, nodes: &[Node]) -> StoreResult<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO nodes (id, type, name, package, file_path, start_line, end_line, exported, content_hash, snippet, props)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            type=excluded.type, name=excluded.name, package=excluded.package,
            file_path=excluded.file_path, start_line=excluded.start_line,
            end_line=excluded.end_line, exported=excluded.exported,
            content_hash=excluded.content_hash, snippet=excluded.snippet, props=excluded.props",
    )?;
    for n in nodes {
        let props = serde_json::to_string(&n.props)?;
        stmt.execute(rusqlite::params![
            n.id.as_str(),
            n.node_type.as_str(),
            n.name,
            n.package,
            n.file_path.as_str(),
            n.start_line,
            n.end_line,
            n.exported as i64,
            n.content_hash,
            n.snippet,
            props,
        ])?;
    }
    Ok(())
}

fn insert_edges(tx: &rusqlite::Transaction, edges: &[Edge]) -> StoreResult<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO edges (source, target, type, meta)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(source, target, type) DO UPDATE SET meta=excluded.meta",
    )?;
    for e in edges {
        let meta = serde_json::to_string(&e.meta)?;
        stmt.execute(rusqlite::params![
            e.source.as_str(),
            e.target.as_str(),
            e.edge_type.as_str(),
            meta,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::types::{EdgeMeta, NodeProps};

    fn node(file: &str, name: &str) -> Node {
        let rel = RelPath::new(file);
        Node {
            id: NodeId::new(&rel, crate::types::NodeType::Function, name),
            node_type: crate::types::NodeType::Function,
            name: name.to_string(),
            package: "pkg".into(),
            file_path: rel,
            start_line: 1,
            end_line: 2,
            exported: true,
            content_hash: "deadbeef".into(),
            snippet: "function foo() {}".into(),
            props: NodeProps::default(),
        }
    }

    #[test]
    fn add_and_remove_file_nodes_is_atomic() {
        let store = Store::open_in_memory().unwrap();
        let n1 = node("src/a.ts", "foo");
        let n2 = node("src/ab.ts", "bar");
        store.add_nodes(&[n1.clone(), n2.clone()]).unwrap();
        let edge = Edge {
            source: n1.id.clone(),
            target: n2.id.clone(),
            edge_type: EdgeType::Calls,
            meta: EdgeMeta::default(),
        };
        store.add_edges(&[edge]).unwrap();

        store.remove_file_nodes(&RelPath::new("src/a.ts")).unwrap();

        // src/ab.ts must survive a delete of src/a.ts (prefix boundary).
        let remaining = store
            .query_nodes(&queries::NodeFilters::default())
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file_path.as_str(), "src/ab.ts");

        let edges = store.query_edges_between(&[n1.id, n2.id]).unwrap();
        assert!(edges.is_empty(), "edge touching a removed node must also be removed");
    }

    #[test]
    fn duplicate_edge_merges_meta_by_replacing() {
        let store = Store::open_in_memory().unwrap();
        let n1 = node("src/a.ts", "foo");
        let n2 = node("src/a.ts", "bar");
        store.add_nodes(&[n1.clone(), n2.clone()]).unwrap();

        let e1 = Edge {
            source: n1.id.clone(),
            target: n2.id.clone(),
            edge_type: EdgeType::Calls,
            meta: EdgeMeta { call_count: Some(1), ..Default::default() },
        };
        let e2 = Edge {
            source: n1.id.clone(),
            target: n2.id.clone(),
            edge_type: EdgeType::Calls,
            meta: EdgeMeta { call_count: Some(2), ..Default::default() },
        };
        store.add_edges(&[e1]).unwrap();
        store.add_edges(&[e2]).unwrap();

        let edges = store.query_edges_between(&[n1.id, n2.id]).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].meta.call_count, Some(2));
    }

    #[test]
    fn shortest_paths_rejects_same_source_and_target() {
        let store = Store::open_in_memory().unwrap();
        let id = NodeId::from("src/a.ts:Function:foo");
        let err = store.query_shortest_paths(&id, &id, 10, 3).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }
}
