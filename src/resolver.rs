//! Symbol resolver: turns `{symbol, file?, module?, package?}` into an
//! opaque [`NodeId`].
//!
//! Linear scan over the small candidate slice the store's `query_nodes`
//! glob already narrows to, plus `strsim` for "did-you-mean" suggestions
//! when nothing matches.

use crate::ids::{NodeId, RelPath};
use crate::store::{NodeFilters, SharedStore};
use crate::types::Node;

#[derive(Debug, Clone)]
pub struct SymbolQuery {
    pub symbol: String,
    pub file: Option<RelPath>,
    pub module: Option<String>,
    pub package: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Unique { id: NodeId, message: Option<String> },
    Ambiguous { candidates: Vec<NodeId> },
    NotFound { suggestions: Vec<String> },
}

/// Resolves `query` against every node currently in the store.
pub fn resolve(store: &SharedStore, query: &SymbolQuery) -> anyhow::Result<ResolveOutcome> {
    let all = store.query_nodes(&NodeFilters { limit: Some(u32::MAX), ..Default::default() })?;

    if let Some(file) = &query.file {
        let in_file: Vec<&Node> = all.iter().filter(|n| &n.file_path == file).collect();

        let exact: Vec<&Node> = in_file.iter().copied().filter(|n| n.name == query.symbol).collect();
        if exact.len() == 1 {
            return Ok(unique(exact[0], None));
        }
        if exact.len() > 1 {
            return Ok(ResolveOutcome::Ambiguous { candidates: exact.iter().map(|n| n.id.clone()).collect() });
        }

        let case_insensitive: Vec<&Node> =
            in_file.iter().copied().filter(|n| n.name.eq_ignore_ascii_case(&query.symbol)).collect();
        if case_insensitive.len() == 1 {
            let msg = format!("resolved `{}` to `{}` by case-insensitive match", query.symbol, case_insensitive[0].name);
            return Ok(unique(case_insensitive[0], Some(msg)));
        }
        if case_insensitive.len() > 1 {
            return Ok(ResolveOutcome::Ambiguous { candidates: case_insensitive.iter().map(|n| n.id.clone()).collect() });
        }

        let method_suffix: Vec<&Node> =
            in_file.iter().copied().filter(|n| method_suffix_matches(&n.id, &query.symbol)).collect();
        if method_suffix.len() == 1 {
            let msg = format!("resolved `{}` to method `{}`", query.symbol, method_suffix[0].name);
            return Ok(unique(method_suffix[0], Some(msg)));
        }
        if method_suffix.len() > 1 {
            return Ok(ResolveOutcome::Ambiguous { candidates: method_suffix.iter().map(|n| n.id.clone()).collect() });
        }

        let suggestions = nearest_names(&query.symbol, in_file.iter().map(|n| n.name.as_str()));
        return Ok(ResolveOutcome::NotFound { suggestions });
    }

    let by_package: Vec<&Node> = all
        .iter()
        .filter(|n| query.package.as_deref().is_none_or(|p| n.package == p))
        .collect();

    let exact: Vec<&Node> = by_package.iter().copied().filter(|n| n.name == query.symbol).collect();
    if exact.len() == 1 {
        return Ok(unique(exact[0], None));
    }
    if exact.len() > 1 {
        return Ok(ResolveOutcome::Ambiguous { candidates: exact.iter().map(|n| n.id.clone()).collect() });
    }

    let case_insensitive: Vec<&Node> =
        by_package.iter().copied().filter(|n| n.name.eq_ignore_ascii_case(&query.symbol)).collect();
    if case_insensitive.len() == 1 {
        let msg = format!("resolved `{}` to `{}` by case-insensitive match", query.symbol, case_insensitive[0].name);
        return Ok(unique(case_insensitive[0], Some(msg)));
    }
    if case_insensitive.len() > 1 {
        return Ok(ResolveOutcome::Ambiguous { candidates: case_insensitive.iter().map(|n| n.id.clone()).collect() });
    }

    let method_suffix: Vec<&Node> =
        by_package.iter().copied().filter(|n| method_suffix_matches(&n.id, &query.symbol)).collect();
    if method_suffix.len() == 1 {
        let msg = format!("resolved `{}` to method `{}`", query.symbol, method_suffix[0].name);
        return Ok(unique(method_suffix[0], Some(msg)));
    }
    if method_suffix.len() > 1 {
        return Ok(ResolveOutcome::Ambiguous { candidates: method_suffix.iter().map(|n| n.id.clone()).collect() });
    }

    let path_suffix: Vec<&Node> =
        by_package.iter().copied().filter(|n| n.id.as_str().ends_with(query.symbol.as_str())).collect();
    if path_suffix.len() == 1 {
        let msg = format!("resolved `{}` by NodeId suffix match", query.symbol);
        return Ok(unique(path_suffix[0], Some(msg)));
    }
    if path_suffix.len() > 1 {
        return Ok(ResolveOutcome::Ambiguous { candidates: path_suffix.iter().map(|n| n.id.clone()).collect() });
    }

    let mut suggestions = nearest_names(&query.symbol, all.iter().map(|n| n.name.as_str()));
    if suggestions.is_empty() {
        suggestions = nearest_names(&query.symbol, all.iter().map(|n| n.file_path.as_str()));
    }
    Ok(ResolveOutcome::NotFound { suggestions })
}

fn unique(node: &Node, message: Option<String>) -> ResolveOutcome {
    ResolveOutcome::Unique { id: node.id.clone(), message }
}

/// `true` if `id`'s symbol path is `Class.method` and `candidate` names the
/// bare `method`, recovering the "method-suffix match" case.
fn method_suffix_matches(id: &NodeId, candidate: &str) -> bool {
    let Ok((_, _, symbol_path)) = id.parse() else { return false };
    match symbol_path.rsplit_once('.') {
        Some((_, method)) => method == candidate,
        None => false,
    }
}

/// Up to 5 Levenshtein-nearest names.
fn nearest_names<'a>(target: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut scored: Vec<(usize, &str)> =
        candidates.map(|c| (strsim::levenshtein(target, c), c)).collect();
    scored.sort_by_key(|(dist, name)| (*dist, name.len()));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(5).map(|(_, name)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeProps, NodeType};

    fn node(file: &str, ty: NodeType, scoped: &str, name: &str) -> Node {
        let rel = RelPath::new(file);
        Node {
            id: NodeId::new(&rel, ty, scoped),
            node_type: ty,
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

    fn store_with(nodes: Vec<Node>) -> SharedStore {
        let store = crate::store::Store::open_in_memory().unwrap();
        store.add_nodes(&nodes).unwrap();
        std::sync::Arc::new(store)
    }

    #[test]
    fn exact_name_match_in_file_is_unique() {
        let n = node("src/a.ts", NodeType::Function, "foo", "foo");
        let store = store_with(vec![n.clone()]);
        let query = SymbolQuery { symbol: "foo".into(), file: Some(RelPath::new("src/a.ts")), module: None, package: None };
        match resolve(&store, &query).unwrap() {
            ResolveOutcome::Unique { id, message } => {
                assert_eq!(id, n.id);
                assert!(message.is_none());
            }
            other => panic!("expected Unique, got {other:?}"),
        }
    }

    #[test]
    fn method_suffix_recovers_scoped_name() {
        let n = node("src/a.ts", NodeType::Method, "User.save", "save");
        let store = store_with(vec![n.clone()]);
        let query = SymbolQuery { symbol: "save".into(), file: Some(RelPath::new("src/a.ts")), module: None, package: None };
        match resolve(&store, &query).unwrap() {
            ResolveOutcome::Unique { id, message } => {
                assert_eq!(id, n.id);
                assert!(message.is_some());
            }
            other => panic!("expected Unique, got {other:?}"),
        }
    }

    #[test]
    fn case_insensitive_match_recovers_differently_cased_name() {
        let n = node("src/a.ts", NodeType::Function, "fetchUser", "fetchUser");
        let store = store_with(vec![n.clone()]);
        let query = SymbolQuery { symbol: "fetchuser".into(), file: Some(RelPath::new("src/a.ts")), module: None, package: None };
        match resolve(&store, &query).unwrap() {
            ResolveOutcome::Unique { id, message } => {
                assert_eq!(id, n.id);
                assert!(message.is_some());
            }
            other => panic!("expected Unique, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_when_name_collides_across_files() {
        let a = node("src/a.ts", NodeType::Function, "foo", "foo");
        let b = node("src/b.ts", NodeType::Function, "foo", "foo");
        let store = store_with(vec![a, b]);
        let query = SymbolQuery { symbol: "foo".into(), file: None, module: None, package: None };
        assert!(matches!(resolve(&store, &query).unwrap(), ResolveOutcome::Ambiguous { .. }));
    }

    #[test]
    fn not_found_suggests_nearest_names() {
        let n = node("src/a.ts", NodeType::Function, "transformItem", "transformItem");
        let store = store_with(vec![n]);
        let query = SymbolQuery { symbol: "transformItms".into(), file: None, module: None, package: None };
        match resolve(&store, &query).unwrap() {
            ResolveOutcome::NotFound { suggestions } => {
                assert_eq!(suggestions, vec!["transformItem".to_string()]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
