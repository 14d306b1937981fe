//! Per-build cache of parsed documents keyed by normalized path.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::dsl::ast::AstDocument;
use crate::dsl::error::CompileError;

#[derive(Debug, Clone)]
pub enum ImportState {
    /// Currently being parsed somewhere on the import chain.
    InProgress,
    Parsed(Arc<AstDocument>),
}

/// Every document parsed during one build, each exactly once.
#[derive(Debug, Default)]
pub struct ImportContext {
    entries: HashMap<PathBuf, ImportState>,
    chain: Vec<PathBuf>,
    completed: Vec<PathBuf>,
}

impl ImportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.chain.clear();
        self.completed.clear();
    }

    /// Canonical key for `path`. Falls back to lexical normalization when
    /// the file does not exist.
    pub fn normalize(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| lexical_normalize(path))
    }

    /// Start parsing `path`.
    ///
    /// Returns the cached document when it was already parsed, `None` when
    /// the caller should parse it now, and an import cycle error when the
    /// path is already on the current chain.
    pub fn begin(&mut self, path: &Path) -> Result<Option<Arc<AstDocument>>, CompileError> {
        match self.entries.get(path) {
            Some(ImportState::Parsed(doc)) => Ok(Some(Arc::clone(doc))),
            Some(ImportState::InProgress) => {
                let start = self.chain.iter().position(|p| p == path).unwrap_or(0);
                let mut chain: Vec<PathBuf> = self.chain[start..].to_vec();
                chain.push(path.to_path_buf());
                Err(CompileError::ImportCycle { chain })
            }
            None => {
                self.entries
                    .insert(path.to_path_buf(), ImportState::InProgress);
                self.chain.push(path.to_path_buf());
                Ok(None)
            }
        }
    }

    pub fn finish(&mut self, path: &Path, document: Arc<AstDocument>) {
        self.entries
            .insert(path.to_path_buf(), ImportState::Parsed(document));
        self.pop_chain(path);
        self.completed.push(path.to_path_buf());
    }

    /// Drop an in-progress entry after a failed parse.
    pub fn abandon(&mut self, path: &Path) {
        if matches!(self.entries.get(path), Some(ImportState::InProgress)) {
            self.entries.remove(path);
        }
        self.pop_chain(path);
    }

    fn pop_chain(&mut self, path: &Path) {
        if let Some(idx) = self.chain.iter().rposition(|p| p == path) {
            self.chain.truncate(idx);
        }
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<AstDocument>> {
        match self.entries.get(path) {
            Some(ImportState::Parsed(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn is_in_progress(&self, path: &Path) -> bool {
        matches!(self.entries.get(path), Some(ImportState::InProgress))
    }

    /// Parsed documents in completion order (imports before importers).
    pub fn documents(&self) -> Vec<Arc<AstDocument>> {
        self.completed
            .iter()
            .filter_map(|path| self.get(path).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::DocumentOrigin;
    use crate::resolve::{FileId, ScopeId};

    fn document(path: &str) -> Arc<AstDocument> {
        Arc::new(AstDocument {
            file: FileId(0),
            path: PathBuf::from(path),
            origin: DocumentOrigin::Project,
            scope: ScopeId(0),
            imports: Vec::new(),
            nodes: Vec::new(),
            shapes: Vec::new(),
        })
    }

    #[test]
    fn parsed_documents_are_shared() {
        let mut ctx = ImportContext::new();
        let path = Path::new("/p/a.jssp");
        assert!(ctx.begin(path).unwrap().is_none());
        let doc = document("/p/a.jssp");
        ctx.finish(path, Arc::clone(&doc));

        let cached = ctx.begin(path).unwrap().unwrap();
        assert!(Arc::ptr_eq(&cached, &doc));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn reentering_an_open_path_is_a_cycle() {
        let mut ctx = ImportContext::new();
        ctx.begin(Path::new("/p/a.jssp")).unwrap();
        ctx.begin(Path::new("/p/b.jssp")).unwrap();
        let err = ctx.begin(Path::new("/p/a.jssp")).unwrap_err();
        match err {
            CompileError::ImportCycle { chain } => assert_eq!(
                chain,
                vec![
                    PathBuf::from("/p/a.jssp"),
                    PathBuf::from("/p/b.jssp"),
                    PathBuf::from("/p/a.jssp"),
                ]
            ),
            other => panic!("expected ImportCycle, got {other:?}"),
        }
    }

    #[test]
    fn abandon_allows_retry() {
        let mut ctx = ImportContext::new();
        let path = Path::new("/p/a.jssp");
        ctx.begin(path).unwrap();
        ctx.abandon(path);
        assert!(ctx.is_empty());
        assert!(ctx.begin(path).unwrap().is_none());
    }

    #[test]
    fn documents_follow_completion_order() {
        let mut ctx = ImportContext::new();
        ctx.begin(Path::new("/p/main.jssp")).unwrap();
        ctx.begin(Path::new("/p/lib.jssp")).unwrap();
        ctx.finish(Path::new("/p/lib.jssp"), document("/p/lib.jssp"));
        ctx.finish(Path::new("/p/main.jssp"), document("/p/main.jssp"));

        let paths: Vec<PathBuf> = ctx.documents().iter().map(|d| d.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/p/lib.jssp"), PathBuf::from("/p/main.jssp")]
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut ctx = ImportContext::new();
        ctx.begin(Path::new("/p/a.jssp")).unwrap();
        ctx.clear();
        assert!(ctx.is_empty());
        assert!(ctx.documents().is_empty());
    }

    #[test]
    fn lexical_normalization_folds_dots() {
        assert_eq!(
            lexical_normalize(Path::new("/p/x/../y/./a.jssp")),
            PathBuf::from("/p/y/a.jssp")
        );
    }
}
