//! The graph data model: nodes, edges, and their variant-specific payloads.
//!
//! A tagged-variant core type with common fields normalized and
//! variant-specific fields carried as a side payload that round-trips
//! through a JSON column in the store (see `store::schema`).

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, RelPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Function,
    Class,
    Method,
    Interface,
    TypeAlias,
    Variable,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Function => "Function",
            NodeType::Class => "Class",
            NodeType::Method => "Method",
            NodeType::Interface => "Interface",
            NodeType::TypeAlias => "TypeAlias",
            NodeType::Variable => "Variable",
        }
    }

    pub fn parse(s: &str) -> Option<NodeType> {
        Some(match s {
            "Function" => NodeType::Function,
            "Class" => NodeType::Class,
            "Method" => NodeType::Method,
            "Interface" => NodeType::Interface,
            "TypeAlias" => NodeType::TypeAlias,
            "Variable" => NodeType::Variable,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Variant-specific fields, persisted as a single JSON side column
/// (`nodes.props`). A given `Node` carries exactly the variant matching its
/// `node_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeProps {
    // Function / Method
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    // Method only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,
    // Class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
    // Interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interface_extends: Vec<String>,
    // TypeAlias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliased_type: Option<String>,
    // Variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_const: Option<bool>,
}

/// A single declaration in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub name: String,
    pub package: String,
    pub file_path: RelPath,
    pub start_line: u32,
    pub end_line: u32,
    pub exported: bool,
    /// SHA-256 (hex) of the canonical source text the embedding was
    /// computed from.
    pub content_hash: String,
    /// Canonicalized source text used for search/embedding.
    pub snippet: String,
    pub props: NodeProps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    // Runtime
    Calls,
    References,
    UsesType,
    // Compile-time
    Extends,
    Includes,
    Implements,
    Takes,
    Returns,
    HasType,
    HasProperty,
    DerivesFrom,
    AliasFor,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Calls => "CALLS",
            EdgeType::References => "REFERENCES",
            EdgeType::UsesType => "USES_TYPE",
            EdgeType::Extends => "EXTENDS",
            EdgeType::Includes => "INCLUDES",
            EdgeType::Implements => "IMPLEMENTS",
            EdgeType::Takes => "TAKES",
            EdgeType::Returns => "RETURNS",
            EdgeType::HasType => "HAS_TYPE",
            EdgeType::HasProperty => "HAS_PROPERTY",
            EdgeType::DerivesFrom => "DERIVES_FROM",
            EdgeType::AliasFor => "ALIAS_FOR",
        }
    }

    pub fn parse(s: &str) -> Option<EdgeType> {
        Some(match s {
            "CALLS" => EdgeType::Calls,
            "REFERENCES" => EdgeType::References,
            "USES_TYPE" => EdgeType::UsesType,
            "EXTENDS" => EdgeType::Extends,
            "INCLUDES" => EdgeType::Includes,
            "IMPLEMENTS" => EdgeType::Implements,
            "TAKES" => EdgeType::Takes,
            "RETURNS" => EdgeType::Returns,
            "HAS_TYPE" => EdgeType::HasType,
            "HAS_PROPERTY" => EdgeType::HasProperty,
            "DERIVES_FROM" => EdgeType::DerivesFrom,
            "ALIAS_FOR" => EdgeType::AliasFor,
            _ => return None,
        })
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, EdgeType::Calls | EdgeType::References | EdgeType::UsesType)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeContext {
    Parameter,
    Return,
    Property,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceContext {
    Callback,
    Property,
    Array,
    Return,
    Assignment,
    Access,
}

/// Edge metadata. Carried as a single JSON column (`edges.meta`); every
/// field is optional and type-dependent on the edge's `EdgeType`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_sites: Vec<CallSite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_type_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imported_symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TypeContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_context: Option<ReferenceContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    pub meta: EdgeMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_strings() {
        for ty in [
            NodeType::Function,
            NodeType::Class,
            NodeType::Method,
            NodeType::Interface,
            NodeType::TypeAlias,
            NodeType::Variable,
        ] {
            assert_eq!(NodeType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn edge_type_runtime_split_matches_spec() {
        assert!(EdgeType::Calls.is_runtime());
        assert!(EdgeType::References.is_runtime());
        assert!(EdgeType::UsesType.is_runtime());
        assert!(!EdgeType::Extends.is_runtime());
        assert!(!EdgeType::AliasFor.is_runtime());
    }

    #[test]
    fn node_props_serializes_only_present_fields() {
        let props = NodeProps {
            return_type: Some("void".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&props).unwrap();
        assert!(json.contains("return_type"));
        assert!(!json.contains("extends"));
    }
}
