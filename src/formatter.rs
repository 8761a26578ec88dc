//! Result formatter: renders a traversal/search result as the
//! two-section text payload — a chain-compacted graph followed by per-node
//! snippet blocks.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;

use crate::ids::NodeId;
use crate::store::SharedStore;
use crate::types::{CallSite, Edge, EdgeType, Node, NodeType};

pub const DEFAULT_MAX_NODES: usize = 50;
pub const DEFAULT_CONTEXT_LINES: u32 = 3;

pub struct FormatterInput<'a> {
    /// Nodes in traversal order — the order chain compaction and
    /// truncation both respect.
    pub nodes: &'a [NodeId],
    pub edges: &'a [Edge],
    /// Query inputs — excluded from the Nodes section.
    pub exclude: &'a HashSet<NodeId>,
    pub max_nodes: usize,
    pub context_lines: u32,
}

/// Renders `input` against `store` (node metadata) and the filesystem
/// (snippet source lines, re-read fresh rather than trusting the possibly
/// truncated embedding-time `node.snippet`).
pub async fn format(store: &SharedStore, project_root: &Path, input: FormatterInput<'_>) -> Result<String> {
    let mut seen = HashSet::new();
    let mut ordered: Vec<NodeId> = Vec::new();
    for id in input.nodes {
        if seen.insert(id.clone()) {
            ordered.push(id.clone());
        }
    }
    let total = ordered.len();
    let truncated = total > input.max_nodes;
    let kept: Vec<NodeId> = if truncated { ordered[..input.max_nodes].to_vec() } else { ordered };
    let kept_set: HashSet<&NodeId> = kept.iter().collect();

    let kept_edges: Vec<&Edge> =
        input.edges.iter().filter(|e| kept_set.contains(&e.source) && kept_set.contains(&e.target)).collect();

    let mut nodes_by_id: HashMap<NodeId, Node> = HashMap::new();
    for id in &kept {
        if let Some(n) = store.get_node(id)? {
            nodes_by_id.insert(id.clone(), n);
        }
    }

    let display_names = assign_display_names(&kept, &nodes_by_id, &kept_edges);

    let mut out = String::new();
    render_graph_section(&mut out, &kept, &kept_edges, &display_names);

    if truncated {
        let _ = writeln!(out, "\n{total} nodes total — Nodes section skipped");
        return Ok(out);
    }

    out.push('\n');
    for id in &kept {
        if input.exclude.contains(id) {
            continue;
        }
        let Some(node) = nodes_by_id.get(id) else { continue };
        render_node_section(&mut out, store, project_root, node, &kept_edges, input.context_lines).await?;
    }

    Ok(out)
}

fn format_display_name(node: &Node, via_edge: Option<EdgeType>) -> String {
    if via_edge == Some(EdgeType::Includes) {
        return format!("<{}>", node.name);
    }
    match node.node_type {
        NodeType::Function | NodeType::Method => format!("{}()", node.name),
        _ => node.name.clone(),
    }
}

/// Assigns a stable display string per node id, disambiguating collisions
/// with a `#N` suffix in traversal order.
fn assign_display_names(
    order: &[NodeId],
    nodes: &HashMap<NodeId, Node>,
    edges: &[&Edge],
) -> HashMap<NodeId, String> {
    let incoming_edge_type: HashMap<&NodeId, EdgeType> =
        edges.iter().map(|e| (&e.target, e.edge_type)).collect();

    let mut base_names: HashMap<NodeId, String> = HashMap::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut out = HashMap::new();

    for id in order {
        let Some(node) = nodes.get(id) else { continue };
        let base = format_display_name(node, incoming_edge_type.get(id).copied());
        base_names.insert(id.clone(), base.clone());
        let count = counts.entry(base).or_insert(0);
        *count += 1;
    }

    let mut seen_so_far: HashMap<String, u32> = HashMap::new();
    for id in order {
        let Some(base) = base_names.get(id) else { continue };
        let total_for_base = counts.get(base).copied().unwrap_or(1);
        let occurrence = seen_so_far.entry(base.clone()).or_insert(0);
        *occurrence += 1;
        let display = if total_for_base > 1 { format!("{base}#{occurrence}") } else { base.clone() };
        out.insert(id.clone(), display);
    }

    out
}

/// Chain compaction: walks single-outdegree runs within the kept edge set,
/// printing `A --TYPE--> B --TYPE--> C`; branch/leaf nodes end the line.
fn render_graph_section(out: &mut String, order: &[NodeId], edges: &[&Edge], display_names: &HashMap<NodeId, String>) {
    let mut out_adj: HashMap<&NodeId, Vec<&Edge>> = HashMap::new();
    for e in edges {
        out_adj.entry(&e.source).or_default().push(e);
    }

    let mut visited_edges: HashSet<(NodeId, NodeId, EdgeType)> = HashSet::new();
    let mut printed_isolated: HashSet<&NodeId> = HashSet::new();

    for start in order {
        let Some(outs) = out_adj.get(start) else { continue };
        for first_edge in outs {
            let key = (first_edge.source.clone(), first_edge.target.clone(), first_edge.edge_type);
            if visited_edges.contains(&key) {
                continue;
            }
            let mut line = display_names.get(start).cloned().unwrap_or_else(|| start.as_str().to_string());
            let mut current = first_edge;
            loop {
                visited_edges.insert((current.source.clone(), current.target.clone(), current.edge_type));
                let target_name =
                    display_names.get(&current.target).cloned().unwrap_or_else(|| current.target.as_str().to_string());
                let _ = write!(line, " --{}--> {}", current.edge_type.as_str(), target_name);

                let next_outs = out_adj.get(&current.target);
                match next_outs {
                    Some(nexts) if nexts.len() == 1 => {
                        let next = nexts[0];
                        let next_key = (next.source.clone(), next.target.clone(), next.edge_type);
                        if visited_edges.contains(&next_key) {
                            break;
                        }
                        current = next;
                    }
                    _ => break,
                }
            }
            out.push_str(&line);
            out.push('\n');
        }
    }

    for id in order {
        if !out_adj.contains_key(id) && !edges.iter().any(|e| &e.target == id) {
            if printed_isolated.insert(id) {
                let name = display_names.get(id).cloned().unwrap_or_else(|| id.as_str().to_string());
                out.push_str(&name);
                out.push('\n');
            }
        }
    }
}

async fn render_node_section(
    out: &mut String,
    store: &SharedStore,
    project_root: &Path,
    node: &Node,
    edges: &[&Edge],
    context_lines: u32,
) -> Result<()> {
    let _ = store; // node metadata already resolved by the caller
    let _ = writeln!(out, "{}:", node.name);
    let _ = writeln!(out, "  type: {}", node.node_type.as_str());
    let _ = writeln!(out, "  file: {}", node.file_path);
    let _ = writeln!(out, "  offset: {}", node.start_line);
    let _ = writeln!(out, "  limit: {}", node.end_line.saturating_sub(node.start_line) + 1);

    let call_sites: Vec<CallSite> = edges
        .iter()
        .filter(|e| e.source == node.id)
        .flat_map(|e| e.meta.call_sites.iter().copied())
        .collect();

    let abs_path = project_root.join(node.file_path.as_str());
    let snippet = match tokio::fs::read_to_string(&abs_path).await {
        Ok(source) => extract_snippet(&source, node.start_line, node.end_line, &call_sites, context_lines),
        Err(_) => node.snippet.clone(),
    };

    let _ = writeln!(out, "  snippet:");
    for line in snippet.lines() {
        let _ = writeln!(out, "  {line}");
    }

    Ok(())
}

/// Snippet extraction policy: whole function if it fits
/// `context_lines` and has no call sites; otherwise the union of
/// `[site.start-context, site.end+context]` windows, clamped to
/// `[start_line, end_line]`, merged, with 1–2 line gaps filled and ≥3 line
/// gaps rendered as `... N lines omitted ...`. Call-site lines get a `>`
/// marker.
pub fn extract_snippet(source: &str, start_line: u32, end_line: u32, call_sites: &[CallSite], context_lines: u32) -> String {
    let lines: Vec<&str> = source.lines().collect();

    if call_sites.is_empty() {
        return render_range(&lines, start_line, end_line, start_line, end_line, &[]);
    }

    let mut windows: Vec<(u32, u32)> = call_sites
        .iter()
        .map(|c| {
            let lo = c.start.saturating_sub(context_lines).max(start_line);
            let hi = (c.end + context_lines).min(end_line);
            (lo, hi)
        })
        .collect();
    windows.sort();

    let mut merged: Vec<(u32, u32)> = Vec::new();
    for (lo, hi) in windows.drain(..) {
        match merged.last_mut() {
            Some((_, last_hi)) if lo <= *last_hi + 2 => {
                *last_hi = (*last_hi).max(hi);
            }
            _ => merged.push((lo, hi)),
        }
    }

    let mut out = String::new();
    let mut prev_end: Option<u32> = None;
    for (lo, hi) in &merged {
        if let Some(prev) = prev_end {
            let gap = lo.saturating_sub(prev) - 1;
            if gap >= 3 {
                let _ = writeln!(out, "  ... {gap} lines omitted ...");
            }
        }
        out.push_str(&render_range(&lines, start_line, end_line, *lo, *hi, call_sites));
        prev_end = Some(*hi);
    }

    out
}

fn render_range(lines: &[&str], file_start: u32, file_end: u32, lo: u32, hi: u32, call_sites: &[CallSite]) -> String {
    let call_line_set: HashSet<u32> = call_sites
        .iter()
        .flat_map(|c| c.start..=c.end)
        .collect();

    let mut out = String::new();
    for line_no in lo.max(file_start)..=hi.min(file_end) {
        let idx = (line_no - 1) as usize;
        let text = lines.get(idx).copied().unwrap_or("");
        let marker = if call_line_set.contains(&line_no) { ">" } else { " " };
        let _ = writeln!(out, "{marker} {line_no}: {text}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_site_marker_matches_scenario_5() {
        let source = "function foo(){\n  bar();\n}";
        let call_sites = vec![CallSite { start: 2, end: 2 }];
        let snippet = extract_snippet(source, 1, 3, &call_sites, 3);
        assert!(snippet.contains("> 2:   bar();"));
        assert!(snippet.contains("  1: function foo(){"));
        assert!(snippet.contains("  3: }"));
    }

    #[test]
    fn gap_of_three_or_more_is_omitted() {
        let source = (1..=20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let call_sites = vec![CallSite { start: 1, end: 1 }, CallSite { start: 15, end: 15 }];
        let snippet = extract_snippet(&source, 1, 20, &call_sites, 1);
        assert!(snippet.contains("lines omitted"));
    }

    #[test]
    fn whole_function_emitted_when_no_call_sites_and_fits() {
        let source = "function foo(){\n  return 1;\n}";
        let snippet = extract_snippet(source, 1, 3, &[], 10);
        assert_eq!(snippet.lines().count(), 3);
    }
}
