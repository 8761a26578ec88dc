//! The recursive-CTE query surface the traversal engine delegates to.

use rusqlite::{params_from_iter, Connection};

use super::StoreResult;
use crate::ids::{NodeId, RelPath};
use crate::types::{Edge, EdgeMeta, EdgeType, Node, NodeProps, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct NodeFilters {
    pub glob: Option<String>,
    pub types: Vec<NodeType>,
    pub packages: Vec<String>,
    pub exported: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NeighborResult {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone)]
pub struct PathResult {
    pub nodes: Vec<NodeId>,
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    let id: String = row.get("id")?;
    let node_type: String = row.get("type")?;
    let file_path: String = row.get("file_path")?;
    let props_json: String = row.get("props")?;
    let props: NodeProps = serde_json::from_str(&props_json).unwrap_or_default();
    Ok(Node {
        id: NodeId::from(id),
        node_type: NodeType::parse(&node_type).unwrap_or(NodeType::Function),
        name: row.get("name")?,
        package: row.get("package")?,
        file_path: RelPath::new(file_path),
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        exported: row.get::<_, i64>("exported")? != 0,
        content_hash: row.get("content_hash")?,
        snippet: row.get("snippet")?,
        props,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    let source: String = row.get("source")?;
    let target: String = row.get("target")?;
    let edge_type: String = row.get("type")?;
    let meta_json: String = row.get("meta")?;
    let meta: EdgeMeta = serde_json::from_str(&meta_json).unwrap_or_default();
    Ok(Edge {
        source: NodeId::from(source),
        target: NodeId::from(target),
        edge_type: EdgeType::parse(&edge_type).unwrap_or(EdgeType::References),
        meta,
    })
}

pub fn get_node(conn: &Connection, id: &NodeId) -> StoreResult<Option<Node>> {
    let mut stmt = conn.prepare_cached("SELECT * FROM nodes WHERE id = ?1")?;
    let node = match stmt.query_row(rusqlite::params![id.as_str()], row_to_node) {
        Ok(n) => Some(n),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };
    Ok(node)
}

/// `query_nodes(glob, filters)` — ordered by `name ASC`, `LIMIT/OFFSET`
/// (default 100).
pub fn query_nodes(conn: &Connection, filters: &NodeFilters) -> StoreResult<Vec<Node>> {
    let mut sql = String::from("SELECT * FROM nodes WHERE 1=1");
    let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(glob) = &filters.glob {
        sql.push_str(" AND name GLOB ?");
        binds.push(Box::new(glob.clone()));
    }
    if !filters.types.is_empty() {
        let placeholders = filters.types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        sql.push_str(&format!(" AND type IN ({})", placeholders));
        for t in &filters.types {
            binds.push(Box::new(t.as_str().to_string()));
        }
    }
    if !filters.packages.is_empty() {
        let placeholders = filters.packages.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        sql.push_str(&format!(" AND package IN ({})", placeholders));
        for p in &filters.packages {
            binds.push(Box::new(p.clone()));
        }
    }
    if let Some(exported) = filters.exported {
        sql.push_str(" AND exported = ?");
        binds.push(Box::new(exported as i64));
    }

    sql.push_str(" ORDER BY name ASC LIMIT ? OFFSET ?");
    binds.push(Box::new(filters.limit.unwrap_or(100) as i64));
    binds.push(Box::new(filters.offset.unwrap_or(0) as i64));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), row_to_node)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn edge_type_filter_sql(edge_types: Option<&[EdgeType]>) -> (String, Vec<String>) {
    match edge_types {
        None | Some([]) => (String::new(), Vec::new()),
        Some(types) => {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            (
                format!(" AND e.type IN ({})", placeholders),
                types.iter().map(|t| t.as_str().to_string()).collect(),
            )
        }
    }
}

/// `query_neighbors(center, distance, direction, edge_types?)` — recursive
/// CTE over `edges`, returning the center plus all reachable nodes within
/// `distance`, plus the edge set whose endpoints are both inside that set.
pub fn query_neighbors(
    conn: &Connection,
    center: &NodeId,
    distance: u32,
    direction: Direction,
    edge_types: Option<&[EdgeType]>,
) -> StoreResult<NeighborResult> {
    let (type_filter, type_binds) = edge_type_filter_sql(edge_types);

    // A single recursive CTE parameterized over `direction` is awkward to
    // express generically in SQLite (the UNION-ALL legs for in/out/both
    // would each need their own type-filter binding). Widen one hop at a
    // time instead — still a handful of round trips for the small depth
    // bounds this API expects.
    let mut frontier = std::collections::HashSet::new();
    frontier.insert(center.as_str().to_string());
    let mut visited = frontier.clone();

    for _ in 0..distance {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = std::collections::HashSet::new();
        for id in &frontier {
            let mut sql = match direction {
                Direction::Out => "SELECT target AS nxt FROM edges WHERE source = ?".to_string(),
                Direction::In => "SELECT source AS nxt FROM edges WHERE target = ?".to_string(),
                Direction::Both => {
                    "SELECT target AS nxt FROM edges WHERE source = ? UNION SELECT source AS nxt FROM edges WHERE target = ?".to_string()
                }
            };
            sql.push_str(&type_filter.replace("e.type", "type"));
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut all_binds: Vec<&dyn rusqlite::ToSql> = Vec::new();
            all_binds.push(id);
            if direction == Direction::Both {
                all_binds.push(id);
            }
            for t in &type_binds {
                all_binds.push(t);
            }
            let rows = stmt.query_map(all_binds.as_slice(), |r| r.get::<_, String>("nxt"))?;
            for r in rows {
                let nxt = r?;
                if visited.insert(nxt.clone()) {
                    next_frontier.insert(nxt);
                }
            }
        }
        frontier = next_frontier;
    }

    let node_ids: Vec<NodeId> = visited.iter().map(|s| NodeId::from(s.clone())).collect();
    let edges = query_edges_between(conn, &node_ids)?;

    Ok(NeighborResult { nodes: node_ids, edges })
}

/// `query_shortest_paths(from, to, max_depth, max_paths)` — BFS via
/// recursive CTE with a JSON-array path accumulator and cycle check.
pub fn query_shortest_paths(
    conn: &Connection,
    from: &NodeId,
    to: &NodeId,
    max_depth: u32,
    max_paths: u32,
) -> StoreResult<Vec<PathResult>> {
    let sql = "
        WITH RECURSIVE search(target, path, depth) AS (
            SELECT e.target, json_array(?1, e.target), 1
            FROM edges e WHERE e.source = ?1
            UNION ALL
            SELECT e.target, json_insert(s.path, '$[#]', e.target), s.depth + 1
            FROM edges e
            JOIN search s ON e.source = s.target
            WHERE s.depth < ?2
              AND NOT EXISTS (SELECT 1 FROM json_each(s.path) WHERE value = e.target)
        )
        SELECT path, depth FROM search WHERE target = ?3 ORDER BY depth ASC LIMIT ?4
    ";
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(
        rusqlite::params![from.as_str(), max_depth, to.as_str(), max_paths],
        |row| {
            let path_json: String = row.get("path")?;
            Ok(path_json)
        },
    )?;

    let mut out = Vec::new();
    for r in rows {
        let path_json = r?;
        let ids: Vec<String> = serde_json::from_str(&path_json).unwrap_or_default();
        out.push(PathResult {
            nodes: ids.into_iter().map(NodeId::from).collect(),
        });
    }
    Ok(out)
}

/// `query_impact(node, max_depth, edge_types)` — transitive closure of
/// incoming edges restricted to `edge_types`.
pub fn query_impact(
    conn: &Connection,
    node: &NodeId,
    max_depth: u32,
    edge_types: &[EdgeType],
) -> StoreResult<Vec<NodeId>> {
    let result = query_neighbors(conn, node, max_depth, Direction::In, Some(edge_types))?;
    Ok(result
        .nodes
        .into_iter()
        .filter(|id| id.as_str() != node.as_str())
        .collect())
}

/// `query_edges_between(node_set)` — all edges with both endpoints in the
/// set.
pub fn query_edges_between(conn: &Connection, node_set: &[NodeId]) -> StoreResult<Vec<Edge>> {
    if node_set.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = node_set.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT * FROM edges WHERE source IN ({ph}) AND target IN ({ph})",
        ph = placeholders
    );
    // Two IN-lists need the id list bound twice.
    let ids: Vec<String> = node_set.iter().map(|id| id.as_str().to_string()).collect();
    let mut all: Vec<String> = ids.clone();
    all.extend(ids);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(all.iter()), row_to_edge)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
