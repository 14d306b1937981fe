//! Symbol resolution: scopes, the per-build import cache and the binder.

pub mod binder;
pub mod imports;
pub mod scope;

pub use imports::{ImportContext, ImportState};
pub use scope::{
    FileId, Scope, ScopeId, ScopeKind, Symbol, SymbolContainer, SymbolId, SymbolKind, SymbolStack,
};
