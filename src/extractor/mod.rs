//! Extractor: turns a parsed [`source::SourceFile`] into
//! `(Vec<Node>, Vec<Edge>)`.
//!
//! One private function per edge-type group, each reading only the current
//! file's declarations/import map — never the whole store — to keep memory
//! use bounded per file regardless of project size.

pub mod source;

use std::collections::HashMap;

use crate::ids::NodeId;
use crate::registry::ProjectRegistry;
use crate::types::{
    CallSite, Edge, EdgeMeta, EdgeType, Node, NodeProps, NodeType, ReferenceContext, TypeContext, Visibility,
};

pub use source::{RawDeclaration, RawReference, RawReferenceKind, SourceFile, StructuralKind, TreeSitterSourceFile};

/// Resolution context built once per file: every way a bare identifier in
/// this file can be turned into a [`NodeId`].
struct Resolver<'a> {
    /// `scoped_name -> id`, e.g. `"User.save" -> id`.
    by_scoped: HashMap<&'a str, NodeId>,
    /// `simple_name -> ids` (first match wins on ambiguity; callers that
    /// need precision match on `by_scoped` first).
    by_simple: HashMap<&'a str, Vec<NodeId>>,
    /// `local_import_name -> id`, resolved via the project registry.
    imports: HashMap<String, NodeId>,
}

impl<'a> Resolver<'a> {
    fn resolve(&self, name: &str) -> Option<NodeId> {
        if let Some(id) = self.by_scoped.get(name) {
            return Some(id.clone());
        }
        if let Some(ids) = self.by_simple.get(name) {
            return ids.first().cloned();
        }
        if let Some(id) = self.imports.get(name) {
            return Some(id.clone());
        }
        // `Class.method` written as a dotted simple name falls back to the
        // method's own simple-name entry (recorded under its bare name too).
        if let Some((_, method)) = name.rsplit_once('.') {
            if let Some(ids) = self.by_simple.get(method) {
                return ids.first().cloned();
            }
        }
        None
    }
}

/// Extracts the graph fragment for one file. `registry` supplies both
/// import-specifier resolution and the cross-file `(file, name) -> NodeId`
/// lookup populated by earlier indexing passes (see `src/registry.rs`).
pub fn extract(source_file: &dyn SourceFile, registry: &ProjectRegistry) -> (Vec<Node>, Vec<Edge>) {
    let file_path = source_file.file_path().clone();
    let decls = source_file.declarations();

    let mut nodes = Vec::with_capacity(decls.len());
    let mut by_scoped: HashMap<&str, NodeId> = HashMap::new();
    let mut by_simple: HashMap<&str, Vec<NodeId>> = HashMap::new();

    for decl in decls {
        let id = NodeId::new(&file_path, decl.node_type, &decl.scoped_name);
        by_scoped.insert(decl.scoped_name.as_str(), id.clone());
        by_simple.entry(decl.name.as_str()).or_default().push(id.clone());
        nodes.push(build_node(&file_path, &id, decl));
    }

    let mut imports = HashMap::new();
    for import in source_file.imports() {
        let Some(target_file) = registry.resolve_import(&file_path, source_file, &import.specifier) else {
            continue;
        };
        for (local, imported) in &import.bindings {
            let imported_name = if imported == "default" || imported == "*" { local } else { imported };
            if let Some(id) = registry.resolve_symbol(&target_file, imported_name) {
                imports.insert(local.clone(), id);
            }
        }
    }

    let resolver = Resolver { by_scoped, by_simple, imports };

    let mut edges = Vec::new();
    edges.extend(extract_calls(source_file.references(), &resolver));
    edges.extend(extract_references(source_file.references(), &resolver));
    edges.extend(extract_structural(source_file.references(), &resolver));
    edges.extend(extract_signatures(decls, &file_path, &resolver));

    (nodes, edges)
}

fn build_node(file_path: &crate::ids::RelPath, id: &NodeId, decl: &RawDeclaration) -> Node {
    let mut props = NodeProps::default();
    match decl.node_type {
        NodeType::Function | NodeType::Method => {
            props.parameters = decl.params.clone();
            props.return_type = decl.return_type.clone();
            props.is_async = Some(decl.is_async);
            if decl.node_type == NodeType::Method {
                props.is_static = Some(decl.is_static);
                props.visibility = Some(Visibility::Public);
            }
        }
        NodeType::Class => {
            props.extends = decl.extends.first().cloned();
            props.implements = decl.implements.clone();
        }
        NodeType::Interface => {
            props.interface_extends = decl.extends.clone();
        }
        NodeType::TypeAlias => {
            props.aliased_type = decl.alias_of.clone();
        }
        NodeType::Variable => {
            props.is_const = Some(decl.is_const);
            props.variable_type = decl.variable_type.clone();
        }
    }

    let content_hash = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(decl.snippet.as_bytes());
        format!("{:x}", hasher.finalize())
    };

    Node {
        id: id.clone(),
        node_type: decl.node_type,
        name: decl.name.clone(),
        package: String::new(),
        file_path: file_path.clone(),
        start_line: decl.start_line,
        end_line: decl.end_line,
        exported: decl.exported,
        content_hash,
        snippet: decl.snippet.clone(),
        props,
    }
}

fn extract_calls(refs: &[RawReference], resolver: &Resolver) -> Vec<Edge> {
    let mut aggregated: HashMap<(NodeId, NodeId), Vec<CallSite>> = HashMap::new();

    for r in refs {
        let RawReferenceKind::Call { callee, .. } = &r.kind else { continue };
        if r.from.is_empty() {
            continue; // module-level call site has no node to attach the edge to
        }
        let Some(source) = resolver.by_scoped.get(r.from.as_str()).cloned() else { continue };
        let Some(target) = resolver.resolve(callee) else { continue };
        if source == target {
            continue;
        }
        aggregated
            .entry((source, target))
            .or_default()
            .push(CallSite { start: r.line, end: r.line });
    }

    aggregated
        .into_iter()
        .map(|((source, target), sites)| Edge {
            source,
            target,
            edge_type: EdgeType::Calls,
            meta: EdgeMeta {
                call_count: Some(sites.len() as u32),
                call_sites: sites,
                ..Default::default()
            },
        })
        .collect()
}

fn extract_references(refs: &[RawReference], resolver: &Resolver) -> Vec<Edge> {
    let mut out = Vec::new();
    for r in refs {
        let RawReferenceKind::Value { target, context } = &r.kind else { continue };
        if r.from.is_empty() {
            continue;
        }
        let Some(source) = resolver.resolve(&r.from) else { continue };
        let Some(target_id) = resolver.resolve(target) else { continue };
        if source == target_id {
            continue;
        }
        let reference_context = match context {
            source::RefContextKind::Argument => ReferenceContext::Callback,
            source::RefContextKind::PropertyValue => ReferenceContext::Property,
            source::RefContextKind::ArrayElement => ReferenceContext::Array,
            source::RefContextKind::ReturnValue => ReferenceContext::Return,
            source::RefContextKind::Assignment => ReferenceContext::Assignment,
            source::RefContextKind::Access => ReferenceContext::Access,
        };
        out.push(Edge {
            source,
            target: target_id,
            edge_type: EdgeType::References,
            meta: EdgeMeta {
                reference_context: Some(reference_context),
                ..Default::default()
            },
        });
    }
    out
}

fn extract_structural(refs: &[RawReference], resolver: &Resolver) -> Vec<Edge> {
    let mut out = Vec::new();
    for r in refs {
        let RawReferenceKind::Structural { target, kind } = &r.kind else { continue };
        let Some(source) = resolver.by_scoped.get(r.from.as_str()).cloned() else { continue };
        let Some(target_id) = resolver.resolve(target) else { continue };
        let edge_type = match kind {
            StructuralKind::Extends => EdgeType::Extends,
            StructuralKind::Implements => EdgeType::Implements,
            StructuralKind::JsxTag => EdgeType::Includes,
        };
        out.push(Edge {
            source,
            target: target_id,
            edge_type,
            meta: EdgeMeta::default(),
        });
    }
    out
}

/// TAKES/RETURNS/HAS_TYPE/HAS_PROPERTY (compile-time signature
/// decomposition) plus the parallel USES_TYPE runtime edge for the same
/// discovered type reference.
fn extract_signatures(decls: &[RawDeclaration], file_path: &crate::ids::RelPath, resolver: &Resolver) -> Vec<Edge> {
    let mut out = Vec::new();

    for decl in decls {
        let source = NodeId::new(file_path, decl.node_type, &decl.scoped_name);

        match decl.node_type {
            NodeType::Function | NodeType::Method => {
                for param in &decl.params {
                    let Some(type_text) = &param.type_ else { continue };
                    for type_name in source::base_type_names(type_text) {
                        push_type_edge(&mut out, resolver, &source, &type_name, TypeContext::Parameter, EdgeType::Takes);
                    }
                }
                if let Some(return_type) = &decl.return_type {
                    for type_name in source::base_type_names(return_type) {
                        push_type_edge(&mut out, resolver, &source, &type_name, TypeContext::Return, EdgeType::Returns);
                    }
                }
            }
            NodeType::Class | NodeType::Interface => {
                for (_, prop_type) in &decl.property_types {
                    let Some(type_text) = prop_type else { continue };
                    for type_name in source::base_type_names(type_text) {
                        push_type_edge(&mut out, resolver, &source, &type_name, TypeContext::Property, EdgeType::HasProperty);
                    }
                }
            }
            NodeType::TypeAlias => {
                if let Some(alias_of) = &decl.alias_of {
                    for type_name in source::base_type_names(alias_of) {
                        if let Some(target) = resolver.resolve(&type_name) {
                            if target != source {
                                out.push(Edge {
                                    source: source.clone(),
                                    target,
                                    edge_type: EdgeType::AliasFor,
                                    meta: EdgeMeta::default(),
                                });
                            }
                        }
                    }
                }
            }
            NodeType::Variable => {
                if let Some(type_text) = &decl.variable_type {
                    for type_name in source::base_type_names(type_text) {
                        push_type_edge(&mut out, resolver, &source, &type_name, TypeContext::Variable, EdgeType::HasType);
                    }
                }
            }
        }
    }

    out
}

fn push_type_edge(
    out: &mut Vec<Edge>,
    resolver: &Resolver,
    source: &NodeId,
    type_name: &str,
    context: TypeContext,
    specific_edge: EdgeType,
) {
    let Some(target) = resolver.resolve(type_name) else { return };
    if &target == source {
        return;
    }
    out.push(Edge {
        source: source.clone(),
        target: target.clone(),
        edge_type: EdgeType::UsesType,
        meta: EdgeMeta { context: Some(context), ..Default::default() },
    });
    out.push(Edge {
        source: source.clone(),
        target,
        edge_type: specific_edge,
        meta: EdgeMeta { context: Some(context), ..Default::default() },
    });
}
