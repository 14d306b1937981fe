//! jssp front end: lexer → parser → binder → AST documents.
//!
//! Files are parsed one at a time; an `import` parses the imported file
//! recursively through the same [`ParserContext`] so every file is parsed at
//! most once per build and import cycles are detected on the current chain.

pub mod ast;
pub mod context;
pub mod error;
pub mod lexer;
pub mod markup;
pub mod parser;
pub mod sql;
pub mod token;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use ast::*;
pub use context::{ParserContext, ParserOptions};
pub use error::CompileError;

use crate::platform::PlatformKey;
use crate::resolve::{binder, ImportContext, ScopeKind, SymbolContainer, SymbolStack};
use lexer::Lexer;
use parser::Parser;

/// Parse `source` as the file named by `options`, reusing the cached document
/// when that file was already parsed in this build.
pub fn parse(
    source: &str,
    options: &ParserOptions,
    ctx: &mut ParserContext,
    stack: &mut SymbolStack,
    container: &mut SymbolContainer,
) -> Result<Arc<AstDocument>, CompileError> {
    let key = ImportContext::normalize(&options.file);
    if let Some(cached) = ctx.imports.begin(&key)? {
        return Ok(cached);
    }

    let options = ParserOptions {
        file: key.clone(),
        ..options.clone()
    };
    match parse_document(source, &options, ctx, stack, container) {
        Ok(document) => {
            let document = Arc::new(document);
            ctx.imports.finish(&key, Arc::clone(&document));
            Ok(document)
        }
        Err(err) => {
            ctx.imports.abandon(&key);
            Err(err)
        }
    }
}

/// Read and parse the file named by `options`.
pub fn parse_file(
    options: &ParserOptions,
    ctx: &mut ParserContext,
    stack: &mut SymbolStack,
    container: &mut SymbolContainer,
) -> Result<Arc<AstDocument>, CompileError> {
    let key = ImportContext::normalize(&options.file);
    if let Some(cached) = ctx.imports.get(&key) {
        return Ok(Arc::clone(cached));
    }
    if ctx.imports.is_in_progress(&key) {
        // Let `parse` build the cycle error with the full chain.
        return parse("", options, ctx, stack, container);
    }

    let source =
        std::fs::read_to_string(&options.file).map_err(|e| CompileError::io(&options.file, &e))?;
    parse(&source, options, ctx, stack, container)
}

fn parse_document(
    source: &str,
    options: &ParserOptions,
    ctx: &mut ParserContext,
    stack: &mut SymbolStack,
    container: &mut SymbolContainer,
) -> Result<AstDocument, CompileError> {
    tracing::debug!(file = %options.file.display(), "parsing");
    let tokens = Lexer::new(source, &options.file).tokenize()?;

    let file = container.register_file(&options.file);
    let root = container.new_scope(ScopeKind::File, None, file);
    stack.push(root);
    let parsed = Parser::new(tokens, file, root, options, ctx, stack, container).parse();
    stack.pop();
    let parsed = parsed?;

    let mut document = AstDocument {
        file,
        path: options.file.clone(),
        origin: options.origin,
        scope: root,
        imports: parsed.imports,
        nodes: parsed.nodes,
        shapes: Vec::new(),
    };

    binder::complete(&mut document, ctx, container);
    container.close_children(file);

    Ok(document)
}

/// Front end for one build.
///
/// Owns the parser context, the scope stack and the symbol arena. A fresh
/// compiler (or one that was [`reset`](Compiler::reset)) must be used per build.
#[derive(Debug, Default)]
pub struct Compiler {
    pub context: ParserContext,
    pub stack: SymbolStack,
    pub symbols: SymbolContainer,
}

impl Compiler {
    pub fn new(platform: Option<PlatformKey>) -> Self {
        Self {
            context: ParserContext::new(platform),
            stack: SymbolStack::new(),
            symbols: SymbolContainer::new(),
        }
    }

    pub fn reset(&mut self) {
        self.context.clear();
        self.stack = SymbolStack::new();
        self.symbols = SymbolContainer::new();
    }

    /// Parse the builtin prelude, if any builtin root has one.
    pub fn load_prelude(&mut self, builtin_paths: &[PathBuf]) -> Result<(), CompileError> {
        let probe = ParserOptions::new(PathBuf::new()).with_builtin_paths(builtin_paths.to_vec());
        let Some(prelude) = probe.prelude() else {
            return Ok(());
        };
        let options = probe.for_import(prelude, DocumentOrigin::Builtin);
        let document = parse_file(&options, &mut self.context, &mut self.stack, &mut self.symbols)?;
        self.symbols.set_prelude(document.scope);
        tracing::debug!(file = %document.path.display(), "loaded prelude");
        Ok(())
    }

    /// Parse an entry file and everything it imports.
    pub fn compile_file(
        &mut self,
        entry: &Path,
        builtin_paths: &[PathBuf],
    ) -> Result<Arc<AstDocument>, CompileError> {
        self.load_prelude(builtin_paths)?;
        let options = ParserOptions::new(entry).with_builtin_paths(builtin_paths.to_vec());
        parse_file(&options, &mut self.context, &mut self.stack, &mut self.symbols)
    }

    /// Parse in-memory source as if it were the file `name`.
    pub fn compile_str(
        &mut self,
        source: &str,
        name: impl Into<PathBuf>,
    ) -> Result<Arc<AstDocument>, CompileError> {
        let options = ParserOptions::new(name);
        parse(
            source,
            &options,
            &mut self.context,
            &mut self.stack,
            &mut self.symbols,
        )
    }

    /// Project documents in completion order (imports first).
    pub fn project_documents(&self) -> Vec<Arc<AstDocument>> {
        self.context
            .imports
            .documents()
            .into_iter()
            .filter(|doc| doc.origin == DocumentOrigin::Project)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use std::fs;

    #[test]
    fn compile_str_binds_and_caches() {
        let mut compiler = Compiler::new(None);
        let doc = compiler
            .compile_str("struct A { x int; }", "mem.jssp")
            .unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(compiler.context.imports.len(), 1);

        let again = compiler.compile_str("ignored", "mem.jssp").unwrap();
        assert!(Arc::ptr_eq(&doc, &again));
    }

    #[test]
    fn imports_share_one_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("common.jssp"), "struct Shared { id int; }").unwrap();
        fs::write(
            dir.path().join("a.jssp"),
            "import 'common.jssp'; struct A { s Shared; }",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.jssp"),
            "import 'common.jssp'; import 'a.jssp'; struct M { s Shared; a A; }",
        )
        .unwrap();

        let mut compiler = Compiler::new(None);
        let main = compiler
            .compile_file(&dir.path().join("main.jssp"), &[])
            .unwrap();
        assert!(!compiler.context.diagnostics.has_errors());
        assert_eq!(compiler.context.imports.len(), 3);

        let via_main = &main.imports[0].document;
        let via_a = &main.imports[1].document.imports[0].document;
        assert!(Arc::ptr_eq(via_main, via_a));
    }

    #[test]
    fn import_cycle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jssp"), "import 'b.jssp';").unwrap();
        fs::write(dir.path().join("b.jssp"), "import 'a.jssp';").unwrap();

        let mut compiler = Compiler::new(None);
        let err = compiler
            .compile_file(&dir.path().join("a.jssp"), &[])
            .unwrap_err();
        match err {
            CompileError::ImportCycle { chain } => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("expected import cycle, got {other:?}"),
        }
    }

    #[test]
    fn imported_names_are_visible_only_after_the_import() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.jssp"), "struct Lib { id int; }").unwrap();
        fs::write(
            dir.path().join("main.jssp"),
            "struct Early { l Lib; } import 'lib.jssp'; struct Late { l Lib; }",
        )
        .unwrap();

        let mut compiler = Compiler::new(None);
        compiler
            .compile_file(&dir.path().join("main.jssp"), &[])
            .unwrap();
        assert_eq!(compiler.context.diagnostics.error_count(), 1);
        assert!(compiler
            .context
            .diagnostics
            .contains(DiagnosticCode::UnresolvedSymbol));
    }

    #[test]
    fn prelude_provides_fallback_symbols() {
        let builtin = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::write(builtin.path().join("prelude.jssp"), "struct Page { title string; }").unwrap();
        fs::write(project.path().join("main.jssp"), "struct Home { page Page; }").unwrap();

        let mut compiler = Compiler::new(None);
        compiler
            .compile_file(
                &project.path().join("main.jssp"),
                &[builtin.path().to_path_buf()],
            )
            .unwrap();
        assert!(!compiler.context.diagnostics.has_errors());
        assert_eq!(compiler.project_documents().len(), 1);
    }

    #[test]
    fn missing_entry_is_an_io_error() {
        let mut compiler = Compiler::new(None);
        let err = compiler
            .compile_file(Path::new("/definitely/not/here.jssp"), &[])
            .unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
