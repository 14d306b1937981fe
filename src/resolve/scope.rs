//! Scopes, symbols and the per-build symbol arena.
//!
//! Every scope and symbol of a build lives in one [`SymbolContainer`] and is
//! addressed by index. Declarations bind eagerly while parsing; references are
//! resolved later against the scope they were written in.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::dsl::ast::NodeId;
use crate::dsl::token::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Root scope of a document.
    File,
    /// Members or parameters of a declaration.
    Declaration,
    /// Statement block; bindings are visible only after their declaration.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Domain,
    Table,
    Entity,
    Struct,
    Mapper,
    Query,
    Controller,
    Handler,
    Api,
    Page,
    Property,
    Func,
    Param,
    Local,
    ResultShape,
}

impl SymbolKind {
    /// Kinds usable where a type is expected.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Self::Domain | Self::Table | Self::Entity | Self::Struct | Self::ResultShape
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Domain => "domain",
            Self::Table => "table",
            Self::Entity => "entity",
            Self::Struct => "struct",
            Self::Mapper => "mapper",
            Self::Query => "query",
            Self::Controller => "controller",
            Self::Handler => "handler",
            Self::Api => "api",
            Self::Page => "page",
            Self::Property => "property",
            Self::Func => "function",
            Self::Param => "parameter",
            Self::Local => "local variable",
            Self::ResultShape => "query result",
        };
        f.write_str(name)
    }
}

/// A declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub file: FileId,
    pub path: PathBuf,
    pub pos: Position,
    /// Source-order sequence number within the declaring file.
    pub seq: u32,
    pub scope: ScopeId,
    /// Declaration that owns this symbol.
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy)]
struct ScopeImport {
    seq: u32,
    scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub file: FileId,
    bindings: HashMap<String, SymbolId>,
    imports: Vec<ScopeImport>,
    closed: bool,
}

impl Scope {
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.bindings.get(name).copied()
    }
}

/// Arena of all scopes, symbols and file identities of one build.
#[derive(Debug, Default)]
pub struct SymbolContainer {
    files: Vec<PathBuf>,
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    prelude: Option<ScopeId>,
}

impl SymbolContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_file(&mut self, path: &Path) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(path.to_path_buf());
        id
    }

    pub fn file_path(&self, file: FileId) -> &Path {
        &self.files[file.0 as usize]
    }

    pub fn new_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>, file: FileId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            parent,
            file,
            bindings: HashMap::new(),
            imports: Vec::new(),
            closed: false,
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Bind `symbol` in `scope`. On a clash the previous binding is returned
    /// as the error and nothing is inserted.
    pub fn declare(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let id = SymbolId(self.symbols.len() as u32);
        let target = &mut self.scopes[scope.0 as usize];
        debug_assert!(!target.closed, "declaring into a closed scope");
        if let Some(&previous) = target.bindings.get(&symbol.name) {
            return Err(previous);
        }
        target.bindings.insert(symbol.name.clone(), id);
        self.symbols.push(Symbol { scope, ..symbol });
        Ok(id)
    }

    /// Make the root scope of an imported file visible from `scope` for
    /// references written after `seq`.
    pub fn add_import(&mut self, scope: ScopeId, imported: ScopeId, seq: u32) {
        self.scopes[scope.0 as usize]
            .imports
            .push(ScopeImport { seq, scope: imported });
    }

    pub fn set_prelude(&mut self, scope: ScopeId) {
        self.prelude = Some(scope);
    }

    /// Resolve `name` as written at sequence `seq` inside `scope`.
    ///
    /// Lookup walks block, declaration and file scopes outwards, then the
    /// file's imports in statement order, then the builtin prelude.
    pub fn resolve(&self, scope: ScopeId, name: &str, seq: u32) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(found) = s.lookup(name) {
                if s.kind != ScopeKind::Block || self.symbol(found).seq < seq {
                    return Some(found);
                }
            }
            if s.kind == ScopeKind::File {
                let imported = s
                    .imports
                    .iter()
                    .filter(|import| import.seq < seq)
                    .find_map(|import| self.scope(import.scope).lookup(name));
                if imported.is_some() {
                    return imported;
                }
            }
            current = s.parent;
        }

        self.prelude.and_then(|prelude| self.scope(prelude).lookup(name))
    }

    /// Close every non-root scope belonging to `file`.
    pub fn close_children(&mut self, file: FileId) {
        for scope in &mut self.scopes {
            if scope.file == file && scope.kind != ScopeKind::File {
                scope.closed = true;
            }
        }
    }
}

/// Stack of scopes currently open while parsing.
#[derive(Debug, Default)]
pub struct SymbolStack {
    frames: Vec<ScopeId>,
}

impl SymbolStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: ScopeId) {
        self.frames.push(scope);
    }

    pub fn pop(&mut self) -> Option<ScopeId> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<ScopeId> {
        self.frames.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, kind: SymbolKind, seq: u32) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind,
            file: FileId(0),
            path: PathBuf::from("a.jssp"),
            pos: Position::new(1, 1),
            seq,
            scope: ScopeId(0),
            node: NodeId(0),
        }
    }

    #[test]
    fn duplicate_declaration_returns_previous() {
        let mut c = SymbolContainer::new();
        let file = c.register_file(Path::new("a.jssp"));
        let root = c.new_scope(ScopeKind::File, None, file);
        let first = c.declare(root, symbol("User", SymbolKind::Struct, 0)).unwrap();
        let err = c.declare(root, symbol("User", SymbolKind::Entity, 1)).unwrap_err();
        assert_eq!(err, first);
        assert_eq!(c.symbol_count(), 1);
    }

    #[test]
    fn resolves_outward_through_parents() {
        let mut c = SymbolContainer::new();
        let file = c.register_file(Path::new("a.jssp"));
        let root = c.new_scope(ScopeKind::File, None, file);
        let decl = c.new_scope(ScopeKind::Declaration, Some(root), file);
        let block = c.new_scope(ScopeKind::Block, Some(decl), file);
        let table = c.declare(root, symbol("tb_user", SymbolKind::Table, 0)).unwrap();
        let param = c.declare(decl, symbol("id", SymbolKind::Param, 2)).unwrap();

        assert_eq!(c.resolve(block, "tb_user", 10), Some(table));
        assert_eq!(c.resolve(block, "id", 10), Some(param));
        assert_eq!(c.resolve(block, "missing", 10), None);
    }

    #[test]
    fn block_locals_are_ordered() {
        let mut c = SymbolContainer::new();
        let file = c.register_file(Path::new("a.jssp"));
        let root = c.new_scope(ScopeKind::File, None, file);
        let block = c.new_scope(ScopeKind::Block, Some(root), file);
        let local = c.declare(block, symbol("x", SymbolKind::Local, 5)).unwrap();

        assert_eq!(c.resolve(block, "x", 3), None);
        assert_eq!(c.resolve(block, "x", 6), Some(local));
    }

    #[test]
    fn file_scope_is_not_ordered() {
        let mut c = SymbolContainer::new();
        let file = c.register_file(Path::new("a.jssp"));
        let root = c.new_scope(ScopeKind::File, None, file);
        let later = c.declare(root, symbol("Later", SymbolKind::Struct, 20)).unwrap();
        assert_eq!(c.resolve(root, "Later", 1), Some(later));
    }

    #[test]
    fn imports_count_only_after_the_statement() {
        let mut c = SymbolContainer::new();
        let a = c.register_file(Path::new("a.jssp"));
        let b = c.register_file(Path::new("b.jssp"));
        let root_a = c.new_scope(ScopeKind::File, None, a);
        let root_b = c.new_scope(ScopeKind::File, None, b);
        let shared = c.declare(root_b, symbol("Shared", SymbolKind::Struct, 0)).unwrap();
        c.add_import(root_a, root_b, 4);

        assert_eq!(c.resolve(root_a, "Shared", 2), None);
        assert_eq!(c.resolve(root_a, "Shared", 5), Some(shared));
    }

    #[test]
    fn own_declarations_shadow_imports_and_prelude() {
        let mut c = SymbolContainer::new();
        let a = c.register_file(Path::new("a.jssp"));
        let p = c.register_file(Path::new("prelude.jssp"));
        let root_a = c.new_scope(ScopeKind::File, None, a);
        let prelude = c.new_scope(ScopeKind::File, None, p);
        let builtin = c.declare(prelude, symbol("Page", SymbolKind::Page, 0)).unwrap();
        let other = c.declare(prelude, symbol("Base", SymbolKind::Page, 1)).unwrap();
        c.set_prelude(prelude);
        let own = c.declare(root_a, symbol("Page", SymbolKind::Struct, 0)).unwrap();

        assert_eq!(c.resolve(root_a, "Page", 9), Some(own));
        assert_ne!(c.resolve(root_a, "Page", 9), Some(builtin));
        assert_eq!(c.resolve(root_a, "Base", 9), Some(other));
    }

    #[test]
    fn close_children_keeps_root_open() {
        let mut c = SymbolContainer::new();
        let file = c.register_file(Path::new("a.jssp"));
        let root = c.new_scope(ScopeKind::File, None, file);
        let decl = c.new_scope(ScopeKind::Declaration, Some(root), file);
        c.close_children(file);
        assert!(!c.scope(root).is_closed());
        assert!(c.scope(decl).is_closed());
    }

    #[test]
    fn stack_tracks_current_scope() {
        let mut stack = SymbolStack::new();
        assert_eq!(stack.current(), None);
        stack.push(ScopeId(1));
        stack.push(ScopeId(2));
        assert_eq!(stack.current(), Some(ScopeId(2)));
        assert_eq!(stack.pop(), Some(ScopeId(2)));
        assert_eq!(stack.depth(), 1);
    }
}
