//! The `SourceFile` facade: the only seam through which the extractor
//! consumes parsed source. `TreeSitterSourceFile` is one concrete
//! implementation, walking the tree-sitter TypeScript grammar's
//! declaration/call/import node shapes into this facade.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tree_sitter::{Node as TsNode, Parser, Tree};

use crate::ids::RelPath;
use crate::types::{NodeType, Parameter};

/// A declaration as seen by the extractor, before it is minted into a graph
/// [`crate::types::Node`]. `parent` is the enclosing class/interface name
/// for methods and properties; `scoped_name` is the dotted path used to
/// build the `NodeId` symbol path (e.g. `User.save`).
#[derive(Debug, Clone)]
pub struct RawDeclaration {
    pub name: String,
    pub scoped_name: String,
    pub node_type: NodeType,
    pub parent: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub exported: bool,
    pub snippet: String,
    pub is_async: bool,
    pub is_static: bool,
    pub params: Vec<Parameter>,
    pub return_type: Option<String>,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub property_types: Vec<(String, Option<String>)>,
    pub alias_of: Option<String>,
    pub is_const: bool,
    /// The declared type annotation on a `const`/`let`/`var` declarator, if
    /// any (e.g. `Foo` in `const x: Foo = ...`).
    pub variable_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefContextKind {
    Argument,
    PropertyValue,
    ArrayElement,
    ReturnValue,
    Assignment,
    Access,
}

#[derive(Debug, Clone)]
pub enum RawReferenceKind {
    /// A call expression: `from` calls `callee`.
    Call { callee: String, is_method_call: bool },
    /// `from` holds a non-invoked reference to `target` (callback argument,
    /// object property value, return value, plain read).
    Value { target: String, context: RefContextKind },
    /// A type name used in a parameter/return/property/variable position.
    TypeUse { type_name: String, context: crate::types::TypeContext },
    /// `extends`/`implements`/JSX tag usage.
    Structural { target: String, kind: StructuralKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralKind {
    Extends,
    Implements,
    JsxTag,
}

#[derive(Debug, Clone)]
pub struct RawReference {
    /// The enclosing declaration's `scoped_name`, or the special call
    /// target for argument-passed callbacks (see extractor/calls.rs). Empty
    /// string means module scope.
    pub from: String,
    pub kind: RawReferenceKind,
    pub line: u32,
}

/// The facade the extractor is written against.
pub trait SourceFile {
    fn file_path(&self) -> &RelPath;
    fn declarations(&self) -> &[RawDeclaration];
    fn references(&self) -> &[RawReference];
    fn imports(&self) -> &[RawImport];
    /// `export { x } from './module'` / `export * from './module'`
    /// statements — re-exports of another module's symbols under this
    /// file's own names.
    fn reexports(&self) -> &[RawReexport];
    /// Resolves an import specifier to an absolute file path, handling path
    /// aliases; step 1 of the registry's three-step import resolution.
    fn resolve_import(&self, specifier: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct RawImport {
    pub specifier: String,
    /// Local binding name -> imported name (same for `import { x }`,
    /// differs for `import { x as y }`). Empty for a namespace/default
    /// import, where `local_name` is used directly.
    pub bindings: Vec<(String, String)>,
    pub is_type_only: bool,
}

#[derive(Debug, Clone)]
pub struct RawReexport {
    pub specifier: String,
    /// Exported name -> name in the source module (same convention as
    /// [`RawImport::bindings`]). `[("*", "*")]` for a bare `export * from`.
    pub bindings: Vec<(String, String)>,
}

pub struct TreeSitterSourceFile {
    file_path: RelPath,
    abs_path: PathBuf,
    declarations: Vec<RawDeclaration>,
    references: Vec<RawReference>,
    imports: Vec<RawImport>,
    reexports: Vec<RawReexport>,
}

impl TreeSitterSourceFile {
    pub fn parse(project_root: &Path, abs_path: &Path, source: &str) -> Result<Self> {
        let is_tsx = abs_path.extension().and_then(|e| e.to_str()) == Some("tsx");
        let language = if is_tsx {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        };

        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .context("failed to load tree-sitter TypeScript grammar")?;
        let tree = parser
            .parse(source, None)
            .context("tree-sitter failed to parse source")?;

        let file_path = RelPath::from_abs(project_root, abs_path);
        let mut declarations = Vec::new();
        let mut references = Vec::new();
        let mut imports = Vec::new();
        let mut reexports = Vec::new();

        walk_module(
            tree.root_node(),
            source.as_bytes(),
            &mut Scope::default(),
            &mut declarations,
            &mut references,
            &mut imports,
            &mut reexports,
        );

        Ok(TreeSitterSourceFile {
            file_path,
            abs_path: abs_path.to_path_buf(),
            declarations,
            references,
            imports,
            reexports,
        })
    }

    fn _tree_unused(&self) -> Option<&Tree> {
        None
    }
}

impl SourceFile for TreeSitterSourceFile {
    fn file_path(&self) -> &RelPath {
        &self.file_path
    }

    fn declarations(&self) -> &[RawDeclaration] {
        &self.declarations
    }

    fn references(&self) -> &[RawReference] {
        &self.references
    }

    fn imports(&self) -> &[RawImport] {
        &self.imports
    }

    fn reexports(&self) -> &[RawReexport] {
        &self.reexports
    }

    fn resolve_import(&self, specifier: &str) -> Option<PathBuf> {
        // Step 1 (path aliases) is project-registry territory; this bare
        // facade only resolves relative specifiers (the extractor falls
        // back to manual resolution when this returns `None` and the
        // specifier is relative).
        if !specifier.starts_with('.') {
            return None;
        }
        let dir = self.abs_path.parent()?;
        Some(dir.join(specifier))
    }
}

#[derive(Default)]
struct Scope {
    class_stack: Vec<String>,
    fn_stack: Vec<String>,
}

impl Scope {
    fn scoped(&self, name: &str) -> String {
        let mut parts: Vec<&str> = self.class_stack.iter().map(String::as_str).collect();
        parts.push(name);
        parts.join(".")
    }

    fn current_from(&self) -> String {
        self.fn_stack.last().cloned().unwrap_or_default()
    }
}

fn text_of<'a>(bytes: &'a [u8], node: TsNode) -> Option<&'a str> {
    std::str::from_utf8(&bytes[node.start_byte()..node.end_byte()]).ok()
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn line_of(node: TsNode) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line_of(node: TsNode) -> u32 {
    node.end_position().row as u32 + 1
}

fn is_exported(node: TsNode) -> bool {
    node.parent().is_some_and(|p| p.kind() == "export_statement")
}

fn snippet_of(bytes: &[u8], node: TsNode) -> String {
    text_of(bytes, node).unwrap_or_default().to_string()
}

fn parse_params(bytes: &[u8], node: TsNode) -> Vec<Parameter> {
    let Some(params_node) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut cursor = params_node.walk();
    for child in params_node.children(&mut cursor) {
        if !matches!(
            child.kind(),
            "required_parameter" | "optional_parameter" | "identifier"
        ) {
            continue;
        }
        let name_node = child.child_by_field_name("pattern").unwrap_or(child);
        let Some(name) = text_of(bytes, name_node) else { continue };
        let type_ = child
            .child_by_field_name("type")
            .and_then(|t| text_of(bytes, t))
            .map(|s| s.trim_start_matches(':').trim().to_string());
        out.push(Parameter { name: name.to_string(), type_ });
    }
    out
}

fn parse_return_type(bytes: &[u8], node: TsNode) -> Option<String> {
    node.child_by_field_name("return_type")
        .and_then(|t| text_of(bytes, t))
        .map(|s| s.trim_start_matches(':').trim().to_string())
}

fn parse_heritage(bytes: &[u8], node: TsNode) -> (Vec<String>, Vec<String>) {
    let mut extends = Vec::new();
    let mut implements = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_heritage" | "extends_clause" => {
                let mut inner = child.walk();
                for c in child.children(&mut inner) {
                    if c.kind() == "extends_clause" {
                        collect_type_names(bytes, c, &mut extends);
                    } else if c.kind() == "implements_clause" {
                        collect_type_names(bytes, c, &mut implements);
                    }
                }
                if child.kind() == "extends_clause" {
                    collect_type_names(bytes, child, &mut extends);
                }
            }
            "implements_clause" => collect_type_names(bytes, child, &mut implements),
            _ => {}
        }
    }
    (extends, implements)
}

fn collect_type_names(bytes: &[u8], node: TsNode, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" | "type_identifier" => {
                if let Some(name) = text_of(bytes, child) {
                    out.push(name.to_string());
                }
            }
            "generic_type" => {
                if let Some(base) = child.child_by_field_name("name").and_then(|n| text_of(bytes, n)) {
                    out.push(base.to_string());
                }
            }
            _ => collect_type_names(bytes, child, out),
        }
    }
}

fn first_identifier(bytes: &[u8], node: TsNode) -> Option<String> {
    if matches!(node.kind(), "identifier" | "property_identifier" | "type_identifier") {
        return text_of(bytes, node).map(String::from);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(name) = first_identifier(bytes, child) {
            return Some(name);
        }
    }
    None
}

fn extract_callee_name(bytes: &[u8], node: TsNode) -> Option<(String, bool)> {
    match node.kind() {
        "identifier" => text_of(bytes, node).map(|n| (n.to_string(), false)),
        "member_expression" => {
            let property = node.child_by_field_name("property")?;
            text_of(bytes, property).map(|n| (n.to_string(), true))
        }
        "subscript_expression" => {
            let index = node.child_by_field_name("index")?;
            let name = text_of(bytes, index).map(strip_quotes)?;
            Some((name, true))
        }
        _ => first_identifier(bytes, node).map(|n| (n, false)),
    }
}

/// Unwraps a type annotation to its base name(s): built-in generic
/// wrappers (`Array`, `Promise`, `Map`, ...) are unwrapped recursively;
/// primitives are skipped.
pub fn base_type_names(type_text: &str) -> Vec<String> {
    const PRIMITIVES: &[&str] = &[
        "string", "number", "boolean", "any", "unknown", "void", "never", "undefined", "null",
        "object", "bigint", "symbol", "this",
    ];
    const WRAPPERS: &[&str] = &["Array", "Promise", "Map", "Set", "ReadonlyArray", "Record"];

    let trimmed = type_text.trim().trim_end_matches("[]");
    let mut names = Vec::new();

    if let Some(open) = trimmed.find('<') {
        let base = trimmed[..open].trim();
        let inner = &trimmed[open + 1..trimmed.rfind('>').unwrap_or(trimmed.len())];
        if WRAPPERS.contains(&base) {
            for part in split_top_level_commas(inner) {
                names.extend(base_type_names(&part));
            }
            return names;
        }
        if !PRIMITIVES.contains(&base) && !base.is_empty() {
            names.push(base.to_string());
        }
        return names;
    }

    for part in trimmed.split(['|', '&']) {
        let part = part.trim();
        if part.is_empty() || PRIMITIVES.contains(&part) || part.starts_with('"') || part.starts_with('\'') {
            continue;
        }
        let ident: String = part.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        if !ident.is_empty() && !PRIMITIVES.contains(&ident.as_str()) {
            names.push(ident);
        }
    }
    names
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn walk_module(
    node: TsNode,
    bytes: &[u8],
    scope: &mut Scope,
    decls: &mut Vec<RawDeclaration>,
    refs: &mut Vec<RawReference>,
    imports: &mut Vec<RawImport>,
    reexports: &mut Vec<RawReexport>,
) {
    match node.kind() {
        "import_statement" => {
            parse_import(node, bytes, imports);
            return;
        }
        "export_statement" => {
            // Only a re-export (`export { x } from './m'` / `export * from
            // './m'`) has a `source` field; a plain `export function foo() {}`
            // or local `export { x }` falls through to normal declaration
            // walking below.
            if node.child_by_field_name("source").is_some() {
                parse_reexport(node, bytes, reexports);
                return;
            }
        }
        "function_declaration" => {
            if let Some(d) = function_decl(node, bytes, scope, NodeType::Function, false) {
                let scoped = d.scoped_name.clone();
                decls.push(d);
                scope.fn_stack.push(scoped);
                walk_children(node, bytes, scope, decls, refs, imports, reexports);
                scope.fn_stack.pop();
                return;
            }
        }
        "method_definition" => {
            let is_static = node
                .child(0)
                .map(|c| c.kind() == "static")
                .unwrap_or(false);
            if let Some(d) = function_decl(node, bytes, scope, NodeType::Method, is_static) {
                let scoped = d.scoped_name.clone();
                decls.push(d);
                scope.fn_stack.push(scoped);
                walk_children(node, bytes, scope, decls, refs, imports, reexports);
                scope.fn_stack.pop();
                return;
            }
        }
        "class_declaration" => {
            if let Some(name) = node.child_by_field_name("name").and_then(|n| text_of(bytes, n)) {
                let (extends, implements) = parse_heritage(bytes, node);
                let mut properties = Vec::new();
                if let Some(body) = node.child_by_field_name("body") {
                    collect_class_properties(bytes, body, &mut properties);
                }
                decls.push(RawDeclaration {
                    name: name.to_string(),
                    scoped_name: scope.scoped(name),
                    node_type: NodeType::Class,
                    parent: None,
                    start_line: line_of(node),
                    end_line: end_line_of(node),
                    exported: is_exported(node),
                    snippet: snippet_of(bytes, node),
                    is_async: false,
                    is_static: false,
                    params: Vec::new(),
                    return_type: None,
                    extends: extends.clone(),
                    implements: implements.clone(),
                    property_types: properties,
                    alias_of: None,
                    is_const: false,
                    variable_type: None,
                });
                for target in &extends {
                    refs.push(RawReference {
                        from: scope.scoped(name),
                        kind: RawReferenceKind::Structural {
                            target: target.clone(),
                            kind: StructuralKind::Extends,
                        },
                        line: line_of(node),
                    });
                }
                for target in &implements {
                    refs.push(RawReference {
                        from: scope.scoped(name),
                        kind: RawReferenceKind::Structural {
                            target: target.clone(),
                            kind: StructuralKind::Implements,
                        },
                        line: line_of(node),
                    });
                }
                scope.class_stack.push(name.to_string());
                walk_children(node, bytes, scope, decls, refs, imports, reexports);
                scope.class_stack.pop();
                return;
            }
        }
        "interface_declaration" => {
            if let Some(name) = node.child_by_field_name("name").and_then(|n| text_of(bytes, n)) {
                let (extends, _) = parse_heritage(bytes, node);
                let mut properties = Vec::new();
                if let Some(body) = node.child_by_field_name("body") {
                    collect_interface_properties(bytes, body, &mut properties);
                }
                decls.push(RawDeclaration {
                    name: name.to_string(),
                    scoped_name: scope.scoped(name),
                    node_type: NodeType::Interface,
                    parent: None,
                    start_line: line_of(node),
                    end_line: end_line_of(node),
                    exported: is_exported(node),
                    snippet: snippet_of(bytes, node),
                    is_async: false,
                    is_static: false,
                    params: Vec::new(),
                    return_type: None,
                    extends: extends.clone(),
                    implements: Vec::new(),
                    property_types: properties,
                    alias_of: None,
                    is_const: false,
                    variable_type: None,
                });
                for target in &extends {
                    refs.push(RawReference {
                        from: scope.scoped(name),
                        kind: RawReferenceKind::Structural {
                            target: target.clone(),
                            kind: StructuralKind::Extends,
                        },
                        line: line_of(node),
                    });
                }
            }
        }
        "type_alias_declaration" => {
            if let Some(name) = node.child_by_field_name("name").and_then(|n| text_of(bytes, n)) {
                let alias_of = node.child_by_field_name("value").and_then(|v| text_of(bytes, v)).map(String::from);
                decls.push(RawDeclaration {
                    name: name.to_string(),
                    scoped_name: scope.scoped(name),
                    node_type: NodeType::TypeAlias,
                    parent: None,
                    start_line: line_of(node),
                    end_line: end_line_of(node),
                    exported: is_exported(node),
                    snippet: snippet_of(bytes, node),
                    is_async: false,
                    is_static: false,
                    params: Vec::new(),
                    return_type: None,
                    extends: Vec::new(),
                    implements: Vec::new(),
                    property_types: Vec::new(),
                    alias_of,
                    is_const: false,
                    variable_type: None,
                });
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let is_const = text_of(bytes, node).is_some_and(|t| t.starts_with("const"));
            let mut cursor = node.walk();
            for declarator in node.children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                handle_variable_declarator(declarator, node, bytes, scope, is_const, decls, refs, imports, reexports);
            }
            return;
        }
        "call_expression" => {
            handle_call(node, bytes, scope, refs);
        }
        "return_statement" => {
            handle_return(node, bytes, scope, refs);
        }
        "jsx_opening_element" | "jsx_self_closing_element" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Some(name) = text_of(bytes, name_node) {
                    if name.chars().next().is_some_and(|c| c.is_uppercase()) {
                        refs.push(RawReference {
                            from: scope.current_from(),
                            kind: RawReferenceKind::Structural {
                                target: name.to_string(),
                                kind: StructuralKind::JsxTag,
                            },
                            line: line_of(node),
                        });
                    }
                }
            }
        }
        _ => {}
    }

    walk_children(node, bytes, scope, decls, refs, imports, reexports);
}

fn walk_children(
    node: TsNode,
    bytes: &[u8],
    scope: &mut Scope,
    decls: &mut Vec<RawDeclaration>,
    refs: &mut Vec<RawReference>,
    imports: &mut Vec<RawImport>,
    reexports: &mut Vec<RawReexport>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_module(child, bytes, scope, decls, refs, imports, reexports);
    }
}

fn function_decl(
    node: TsNode,
    bytes: &[u8],
    scope: &Scope,
    node_type: NodeType,
    is_static: bool,
) -> Option<RawDeclaration> {
    let name_node = node.child_by_field_name("name")?;
    let name = text_of(bytes, name_node)?.to_string();
    let is_async = text_of(bytes, node).is_some_and(|t| t.trim_start().starts_with("async"));
    Some(RawDeclaration {
        scoped_name: scope.scoped(&name),
        parent: scope.class_stack.last().cloned(),
        node_type,
        start_line: line_of(node),
        end_line: end_line_of(node),
        exported: is_exported(node),
        snippet: snippet_of(bytes, node),
        is_async,
        is_static,
        params: parse_params(bytes, node),
        return_type: parse_return_type(bytes, node),
        extends: Vec::new(),
        implements: Vec::new(),
        property_types: Vec::new(),
        alias_of: None,
        is_const: false,
        variable_type: None,
        name,
    })
}

fn collect_class_properties(bytes: &[u8], body: TsNode, out: &mut Vec<(String, Option<String>)>) {
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        match member.kind() {
            "method_definition" => {
                // methods are emitted as their own declarations by the caller
            }
            "public_field_definition" | "property_signature" => {
                if let Some(name) = member.child_by_field_name("name").and_then(|n| text_of(bytes, n)) {
                    let ty = member
                        .child_by_field_name("type")
                        .and_then(|t| text_of(bytes, t))
                        .map(|s| s.trim_start_matches(':').trim().to_string());
                    out.push((name.to_string(), ty));
                }
            }
            _ => {}
        }
    }
}

fn collect_interface_properties(bytes: &[u8], body: TsNode, out: &mut Vec<(String, Option<String>)>) {
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        if member.kind() == "property_signature" {
            if let Some(name) = member.child_by_field_name("name").and_then(|n| text_of(bytes, n)) {
                let ty = member
                    .child_by_field_name("type")
                    .and_then(|t| text_of(bytes, t))
                    .map(|s| s.trim_start_matches(':').trim().to_string());
                out.push((name.to_string(), ty));
            }
        }
    }
}

fn handle_variable_declarator(
    declarator: TsNode,
    decl_stmt: TsNode,
    bytes: &[u8],
    scope: &mut Scope,
    is_const: bool,
    decls: &mut Vec<RawDeclaration>,
    refs: &mut Vec<RawReference>,
    imports: &mut Vec<RawImport>,
    reexports: &mut Vec<RawReexport>,
) {
    let Some(name_node) = declarator.child_by_field_name("name") else { return };
    let Some(name) = text_of(bytes, name_node) else { return };
    let init = declarator.child_by_field_name("value");
    let variable_type = declarator
        .child_by_field_name("type")
        .and_then(|t| text_of(bytes, t))
        .map(|s| s.trim_start_matches(':').trim().to_string());

    if let Some(init) = init {
        if matches!(init.kind(), "arrow_function" | "function") {
            let is_async = text_of(bytes, init).is_some_and(|t| t.trim_start().starts_with("async"));
            decls.push(RawDeclaration {
                name: name.to_string(),
                scoped_name: scope.scoped(name),
                node_type: NodeType::Function,
                parent: None,
                start_line: line_of(declarator),
                end_line: end_line_of(declarator),
                exported: is_exported(decl_stmt),
                snippet: snippet_of(bytes, declarator),
                is_async,
                is_static: false,
                params: parse_params(bytes, init),
                return_type: parse_return_type(bytes, init),
                extends: Vec::new(),
                implements: Vec::new(),
                property_types: Vec::new(),
                alias_of: None,
                is_const,
                variable_type: None,
            });
            scope.fn_stack.push(scope.scoped(name));
            walk_children(init, bytes, scope, decls, refs, imports, reexports);
            scope.fn_stack.pop();
            return;
        }

        if init.kind() == "object" {
            collect_object_property_values(init, bytes, name, refs);
        }
    }

    decls.push(RawDeclaration {
        name: name.to_string(),
        scoped_name: scope.scoped(name),
        node_type: NodeType::Variable,
        parent: None,
        start_line: line_of(declarator),
        end_line: end_line_of(declarator),
        exported: is_exported(decl_stmt),
        snippet: snippet_of(bytes, declarator),
        is_async: false,
        is_static: false,
        params: Vec::new(),
        return_type: None,
        extends: Vec::new(),
        implements: Vec::new(),
        property_types: Vec::new(),
        alias_of: None,
        is_const,
        variable_type,
    });

    walk_children(declarator, bytes, scope, decls, refs, imports, reexports);
}

fn collect_object_property_values(object: TsNode, bytes: &[u8], owner: &str, refs: &mut Vec<RawReference>) {
    let mut cursor = object.walk();
    for pair in object.children(&mut cursor) {
        if pair.kind() != "pair" {
            continue;
        }
        let Some(value) = pair.child_by_field_name("value") else { continue };
        if value.kind() == "identifier" {
            if let Some(name) = text_of(bytes, value) {
                refs.push(RawReference {
                    from: owner.to_string(),
                    kind: RawReferenceKind::Value {
                        target: name.to_string(),
                        context: RefContextKind::PropertyValue,
                    },
                    line: line_of(pair),
                });
            }
        }
    }
}

fn handle_call(node: TsNode, bytes: &[u8], scope: &mut Scope, refs: &mut Vec<RawReference>) {
    let Some(callee_node) = node
        .child_by_field_name("function")
        .or_else(|| node.child_by_field_name("callee"))
    else {
        return;
    };
    let Some((callee, is_method_call)) = extract_callee_name(bytes, callee_node) else { return };

    refs.push(RawReference {
        from: scope.current_from(),
        kind: RawReferenceKind::Call { callee: callee.clone(), is_method_call },
        line: line_of(node),
    });

    if let Some(args) = node.child_by_field_name("arguments") {
        let mut cursor = args.walk();
        for arg in args.children(&mut cursor) {
            if arg.kind() == "identifier" {
                if let Some(name) = text_of(bytes, arg) {
                    if name != callee {
                        refs.push(RawReference {
                            from: callee.clone(),
                            kind: RawReferenceKind::Value {
                                target: name.to_string(),
                                context: RefContextKind::Argument,
                            },
                            line: line_of(arg),
                        });
                    }
                }
            }
        }
    }
}

fn handle_return(node: TsNode, bytes: &[u8], scope: &mut Scope, refs: &mut Vec<RawReference>) {
    let from = scope.current_from();
    if from.is_empty() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" {
            if let Some(name) = text_of(bytes, child) {
                refs.push(RawReference {
                    from: from.clone(),
                    kind: RawReferenceKind::Value {
                        target: name.to_string(),
                        context: RefContextKind::ReturnValue,
                    },
                    line: line_of(child),
                });
            }
        }
    }
}

fn parse_import(node: TsNode, bytes: &[u8], imports: &mut Vec<RawImport>) {
    let Some(source_node) = node.child_by_field_name("source") else { return };
    let Some(specifier) = text_of(bytes, source_node).map(strip_quotes) else { return };
    let is_type_only = text_of(bytes, node).is_some_and(|t| t.trim_start().starts_with("import type"));

    let mut bindings = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_clause" => collect_import_clause(child, bytes, &mut bindings),
            _ => {}
        }
    }

    imports.push(RawImport { specifier, bindings, is_type_only });
}

fn parse_reexport(node: TsNode, bytes: &[u8], reexports: &mut Vec<RawReexport>) {
    let Some(source_node) = node.child_by_field_name("source") else { return };
    let Some(specifier) = text_of(bytes, source_node).map(strip_quotes) else { return };

    let mut bindings = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "export_clause" => collect_export_clause(child, bytes, &mut bindings),
            "*" => bindings.push(("*".to_string(), "*".to_string())),
            _ => {}
        }
    }

    reexports.push(RawReexport { specifier, bindings });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(source: &str) -> TreeSitterSourceFile {
        TreeSitterSourceFile::parse(Path::new("/proj"), Path::new("/proj/src/a.ts"), source).unwrap()
    }

    #[test]
    fn typed_const_produces_a_variable_node_with_its_type() {
        let file = parse("const x: Foo = compute();");
        let decl = file.declarations.iter().find(|d| d.name == "x").expect("variable declaration");
        assert_eq!(decl.node_type, NodeType::Variable);
        assert_eq!(decl.variable_type.as_deref(), Some("Foo"));
    }

    #[test]
    fn untyped_primitive_const_still_produces_a_node() {
        let file = parse("const count = 0;");
        let decl = file.declarations.iter().find(|d| d.name == "count").expect("variable declaration");
        assert_eq!(decl.node_type, NodeType::Variable);
        assert_eq!(decl.variable_type, None);
    }

    #[test]
    fn named_reexport_captures_specifier_and_bindings() {
        let file = parse("export { foo as bar } from './helpers';");
        assert_eq!(file.reexports.len(), 1);
        assert_eq!(file.reexports[0].specifier, "./helpers");
        assert_eq!(file.reexports[0].bindings, vec![("bar".to_string(), "foo".to_string())]);
    }

    #[test]
    fn wildcard_reexport_is_captured_as_a_sentinel_binding() {
        let file = parse("export * from './helpers';");
        assert_eq!(file.reexports.len(), 1);
        assert_eq!(file.reexports[0].bindings, vec![("*".to_string(), "*".to_string())]);
    }

    #[test]
    fn plain_export_without_source_is_not_a_reexport() {
        let file = parse("export function foo() {}");
        assert!(file.reexports.is_empty());
        assert_eq!(file.declarations.len(), 1);
    }
}

fn collect_export_clause(node: TsNode, bytes: &[u8], out: &mut Vec<(String, String)>) {
    let mut cursor = node.walk();
    for spec in node.children(&mut cursor) {
        if spec.kind() != "export_specifier" {
            continue;
        }
        let source_name = spec.child_by_field_name("name").and_then(|n| text_of(bytes, n));
        let exported_name = spec.child_by_field_name("alias").and_then(|n| text_of(bytes, n));
        if let Some(source_name) = source_name {
            out.push((exported_name.unwrap_or(source_name).to_string(), source_name.to_string()));
        }
    }
}

fn collect_import_clause(node: TsNode, bytes: &[u8], out: &mut Vec<(String, String)>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                if let Some(name) = text_of(bytes, child) {
                    out.push((name.to_string(), "default".to_string()));
                }
            }
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let imported = spec.child_by_field_name("name").and_then(|n| text_of(bytes, n));
                    let local = spec.child_by_field_name("alias").and_then(|n| text_of(bytes, n));
                    if let Some(imported) = imported {
                        out.push((local.unwrap_or(imported).to_string(), imported.to_string()));
                    }
                }
            }
            "namespace_import" => {
                if let Some(name) = first_identifier(bytes, child) {
                    out.push((name, "*".to_string()));
                }
            }
            _ => {}
        }
    }
}
