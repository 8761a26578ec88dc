//! Project registry: maps a configured package name to a parsed project
//! object, and maintains the cross-file symbol lookup the extractor uses
//! to resolve imports without re-reading the whole store. Caches a parsed
//! unit per package root and answers "does this path belong to a
//! configured package" queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::extractor::SourceFile;
use crate::ids::{NodeId, RelPath};
use crate::types::Node;

/// One configured TypeScript package, per `ts-graph-mcp.config.json`'s
/// `packages` array.
#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub name: String,
    pub tsconfig: PathBuf,
    pub root: PathBuf,
}

/// A parsed project: currently just its root and package name, opaque to
/// the core beyond that.
#[derive(Debug, Clone)]
pub struct Project {
    pub package: String,
    pub root: PathBuf,
}

pub struct ProjectRegistry {
    project_root: PathBuf,
    packages: Vec<PackageConfig>,
    projects: RwLock<HashMap<PathBuf, Project>>,
    /// `(file, simple_name) -> NodeId`, populated by the indexer after each
    /// file's nodes are built; consulted by the extractor when resolving
    /// imports and re-export chains.
    symbols: RwLock<HashMap<(RelPath, String), NodeId>>,
    /// `(file, exported_name) -> (target_file, name_in_target)`, populated
    /// from `export { x as y } from './module'` statements.
    reexports: RwLock<HashMap<(RelPath, String), (RelPath, String)>>,
    /// `export * from './module'` targets per re-exporting file, tried in
    /// registration order when a named re-export lookup misses.
    wildcard_reexports: RwLock<HashMap<RelPath, Vec<RelPath>>>,
}

/// Re-export chains can in principle cycle (`a.ts` re-exports from `b.ts`
/// which re-exports from `a.ts`); this bounds how many hops `resolve_symbol`
/// will follow before giving up.
const MAX_REEXPORT_DEPTH: u32 = 8;

impl ProjectRegistry {
    pub fn new(project_root: PathBuf, packages: Vec<PackageConfig>) -> Self {
        ProjectRegistry {
            project_root,
            packages,
            projects: RwLock::new(HashMap::new()),
            symbols: RwLock::new(HashMap::new()),
            reexports: RwLock::new(HashMap::new()),
            wildcard_reexports: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with a single implicit package rooted at `project_root`,
    /// for the common case of a bare `packages` key or an auto-detected
    /// `tsconfig.json`.
    pub fn single_package(project_root: PathBuf) -> Self {
        let tsconfig = project_root.join("tsconfig.json");
        let packages = vec![PackageConfig {
            name: "default".to_string(),
            tsconfig,
            root: project_root.clone(),
        }];
        Self::new(project_root, packages)
    }

    /// Returns the cached [`Project`] for the package owning `tsconfig`,
    /// parsing (and caching) it on first access.
    pub fn project_for(&self, tsconfig: &Path) -> Option<Project> {
        if let Some(p) = self.projects.read().get(tsconfig) {
            return Some(p.clone());
        }
        let config = self.packages.iter().find(|p| p.tsconfig == tsconfig)?;
        let project = Project { package: config.name.clone(), root: config.root.clone() };
        self.projects.write().insert(tsconfig.to_path_buf(), project.clone());
        Some(project)
    }

    /// `true` if `path` is owned by any configured package — used by the
    /// watcher to skip files outside any project before indexing.
    pub fn contains(&self, path: &Path) -> bool {
        self.packages.iter().any(|p| path.starts_with(&p.root))
    }

    /// Registers every node built for `file`, keyed by its simple name, so
    /// later extractions of files that import from `file` can resolve
    /// those imports. Call once per successful `index_file`.
    pub fn register_declarations(&self, file: &RelPath, nodes: &[Node]) {
        let mut symbols = self.symbols.write();
        symbols.retain(|(f, _), _| f != file);
        for node in nodes {
            symbols.insert((file.clone(), node.name.clone()), node.id.clone());
        }
    }

    /// Drops every registered symbol for `file` (mirrors `store::remove_file_nodes`).
    pub fn unregister_file(&self, file: &RelPath) {
        self.symbols.write().retain(|(f, _), _| f != file);
        self.reexports.write().retain(|(f, _), _| f != file);
        self.wildcard_reexports.write().remove(file);
    }

    /// Registers `file`'s `export { x as y } from './module'` and
    /// `export * from './module'` statements so `resolve_symbol` can follow
    /// them to the module that actually declares the name. Call once per
    /// successful `index_file`, alongside `register_declarations`.
    pub fn register_reexports(&self, file: &RelPath, source_file: &dyn SourceFile) {
        self.reexports.write().retain(|(f, _), _| f != file);
        self.wildcard_reexports.write().remove(file);

        let mut named = Vec::new();
        let mut wildcards = Vec::new();
        for reexport in source_file.reexports() {
            let Some(target) = self.resolve_import(file, source_file, &reexport.specifier) else { continue };
            for (exported, source_name) in &reexport.bindings {
                if exported == "*" && source_name == "*" {
                    wildcards.push(target.clone());
                } else {
                    named.push(((file.clone(), exported.clone()), (target.clone(), source_name.clone())));
                }
            }
        }

        if !wildcards.is_empty() {
            self.wildcard_reexports.write().insert(file.clone(), wildcards);
        }
        let mut reexports = self.reexports.write();
        for (key, value) in named {
            reexports.insert(key, value);
        }
    }

    /// Resolves `name` declared in `file` to its `NodeId`, following
    /// re-export chains (registered via [`Self::register_reexports`]) when
    /// `file` only re-exports the name rather than declaring it.
    pub fn resolve_symbol(&self, file: &RelPath, name: &str) -> Option<NodeId> {
        self.resolve_symbol_at_depth(file, name, 0)
    }

    fn resolve_symbol_at_depth(&self, file: &RelPath, name: &str, depth: u32) -> Option<NodeId> {
        if let Some(id) = self.symbols.read().get(&(file.clone(), name.to_string())).cloned() {
            return Some(id);
        }
        if depth >= MAX_REEXPORT_DEPTH {
            return None;
        }
        if let Some((target, source_name)) = self.reexports.read().get(&(file.clone(), name.to_string())).cloned() {
            if let Some(id) = self.resolve_symbol_at_depth(&target, &source_name, depth + 1) {
                return Some(id);
            }
        }
        if let Some(targets) = self.wildcard_reexports.read().get(file).cloned() {
            for target in targets {
                if let Some(id) = self.resolve_symbol_at_depth(&target, name, depth + 1) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Three-step import resolution:
    /// 1. ask the parser for the target (handles path aliases);
    /// 2. if unresolved and the specifier is relative, resolve manually
    ///    (`.js` → `.ts`, `.jsx` → `.tsx`, extensionless → `.ts`);
    /// 3. re-export chains: if the imported name isn't declared directly in
    ///    the resolved target file, `resolve_symbol` walks the target's own
    ///    registered re-exports (and theirs, up to `MAX_REEXPORT_DEPTH`)
    ///    until it finds the file that actually declares the name.
    pub fn resolve_import(
        &self,
        from_file: &RelPath,
        source_file: &dyn SourceFile,
        specifier: &str,
    ) -> Option<RelPath> {
        if let Some(abs) = source_file.resolve_import(specifier) {
            return self.to_rel_existing(&abs);
        }

        if specifier.starts_with('.') {
            let from_abs = self.project_root.join(from_file.as_str());
            let dir = from_abs.parent()?;
            let joined = dir.join(specifier);
            for candidate in manual_extension_candidates(&joined) {
                if candidate.exists() {
                    return Some(RelPath::from_abs(&self.project_root, &candidate));
                }
            }
        }

        None
    }

    fn to_rel_existing(&self, abs: &Path) -> Option<RelPath> {
        for candidate in manual_extension_candidates(abs) {
            if candidate.exists() {
                return Some(RelPath::from_abs(&self.project_root, &candidate));
            }
        }
        None
    }
}

/// `.js -> .ts`, `.jsx -> .tsx`, extensionless -> `.ts`/`.tsx`/`index.ts`.
fn manual_extension_candidates(path: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if path.exists() {
        out.push(path.to_path_buf());
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => out.push(path.with_extension("ts")),
        Some("jsx") => out.push(path.with_extension("tsx")),
        Some(_) => {}
        None => {
            out.push(path.with_extension("ts"));
            out.push(path.with_extension("tsx"));
            out.push(path.join("index.ts"));
            out.push(path.join("index.tsx"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn registry_round_trips_symbol_lookups() {
        let temp = TempDir::new().unwrap();
        let registry = ProjectRegistry::single_package(temp.path().to_path_buf());
        let file = RelPath::new("src/a.ts");
        let node = crate::types::Node {
            id: NodeId::new(&file, crate::types::NodeType::Function, "foo"),
            node_type: crate::types::NodeType::Function,
            name: "foo".to_string(),
            package: String::new(),
            file_path: file.clone(),
            start_line: 1,
            end_line: 2,
            exported: true,
            content_hash: "x".to_string(),
            snippet: "function foo() {}".to_string(),
            props: Default::default(),
        };
        registry.register_declarations(&file, std::slice::from_ref(&node));
        assert_eq!(registry.resolve_symbol(&file, "foo"), Some(node.id));
        registry.unregister_file(&file);
        assert_eq!(registry.resolve_symbol(&file, "foo"), None);
    }

    #[test]
    fn resolve_symbol_follows_named_reexport_chain() {
        use crate::extractor::TreeSitterSourceFile;

        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("impl.ts"), "export function foo() {}").unwrap();
        std::fs::write(temp.path().join("barrel.ts"), "export { foo } from './impl';").unwrap();

        let registry = ProjectRegistry::single_package(temp.path().to_path_buf());

        let impl_source = std::fs::read_to_string(temp.path().join("impl.ts")).unwrap();
        let impl_file = TreeSitterSourceFile::parse(temp.path(), &temp.path().join("impl.ts"), &impl_source).unwrap();
        let (nodes, _) = crate::extractor::extract(&impl_file, &registry);
        registry.register_declarations(impl_file.file_path(), &nodes);

        let barrel_source = std::fs::read_to_string(temp.path().join("barrel.ts")).unwrap();
        let barrel_file =
            TreeSitterSourceFile::parse(temp.path(), &temp.path().join("barrel.ts"), &barrel_source).unwrap();
        registry.register_reexports(barrel_file.file_path(), &barrel_file);

        let foo_id = nodes.iter().find(|n| n.name == "foo").unwrap().id.clone();
        assert_eq!(registry.resolve_symbol(barrel_file.file_path(), "foo"), Some(foo_id));
    }

    #[test]
    fn contains_checks_package_root_prefix() {
        let temp = TempDir::new().unwrap();
        let registry = ProjectRegistry::single_package(temp.path().to_path_buf());
        assert!(registry.contains(&temp.path().join("src/a.ts")));
        assert!(!registry.contains(Path::new("/somewhere/else/a.ts")));
    }
}
