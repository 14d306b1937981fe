//! Per-build parser state and per-file parser options.

use std::path::{Path, PathBuf};

use super::ast::{AnnotationBlock, DocumentOrigin, NodeId};
use super::error::CompileError;
use crate::diagnostics::Diagnostics;
use crate::platform::PlatformKey;
use crate::resolve::ImportContext;

/// Annotation key that restricts a declaration to some platforms.
pub const PLATFORM_ANNOTATION: &str = "platform";

/// State shared by every file parsed during one build.
#[derive(Debug, Default)]
pub struct ParserContext {
    /// Target platform; `None` keeps every platform-conditional declaration.
    pub platform: Option<PlatformKey>,
    pub imports: ImportContext,
    pub diagnostics: Diagnostics,
    next_node: u32,
}

impl ParserContext {
    pub fn new(platform: Option<PlatformKey>) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }

    /// Reset for a new build, keeping the platform.
    pub fn clear(&mut self) {
        self.imports.clear();
        self.diagnostics = Diagnostics::new();
        self.next_node = 0;
    }

    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Record a non-fatal error or warning.
    pub fn report(&mut self, err: CompileError) {
        self.diagnostics.push(err.to_diagnostic());
    }

    /// Whether a declaration carrying `annotations` takes part in this build.
    pub fn is_active(&self, annotations: &AnnotationBlock) -> bool {
        let (Some(platform), Some(list)) = (self.platform, annotations.text(PLATFORM_ANNOTATION))
        else {
            return true;
        };
        list.split(',')
            .map(str::trim)
            .any(|name| name.eq_ignore_ascii_case(platform.as_str()))
    }
}

/// Options for parsing one file.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub file: PathBuf,
    pub origin: DocumentOrigin,
    /// Ordered builtin library roots searched for imports.
    pub builtin_paths: Vec<PathBuf>,
}

impl ParserOptions {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            origin: DocumentOrigin::Project,
            builtin_paths: Vec::new(),
        }
    }

    pub fn with_builtin_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.builtin_paths = paths;
        self
    }

    /// Options for a file reached through an import of this one.
    pub fn for_import(&self, file: PathBuf, origin: DocumentOrigin) -> Self {
        Self {
            file,
            origin,
            builtin_paths: self.builtin_paths.clone(),
        }
    }

    /// Locate an import as written in this file.
    ///
    /// `@`-prefixed paths are searched only in the builtin roots. Other paths
    /// are relative to this file's directory and fall back to the builtin
    /// roots. The first match wins.
    pub fn locate_import(&self, written: &str) -> Option<(PathBuf, DocumentOrigin)> {
        if let Some(rest) = written.strip_prefix('@') {
            return self.search_builtin(rest.trim_start_matches('/'));
        }

        let dir = self.file.parent().unwrap_or_else(|| Path::new("."));
        let local = dir.join(written);
        if local.is_file() {
            return Some((local, self.origin));
        }
        self.search_builtin(written)
    }

    fn search_builtin(&self, relative: &str) -> Option<(PathBuf, DocumentOrigin)> {
        self.builtin_paths
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
            .map(|found| (found, DocumentOrigin::Builtin))
    }

    /// `prelude.jssp` of the first builtin root that has one.
    pub fn prelude(&self) -> Option<PathBuf> {
        self.builtin_paths
            .iter()
            .map(|root| root.join("prelude.jssp"))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::AnnotationValue;
    use std::fs;

    fn platform_block(value: &str) -> AnnotationBlock {
        AnnotationBlock::from_pairs(vec![(
            PLATFORM_ANNOTATION.to_string(),
            AnnotationValue::Str(value.to_string()),
        )])
    }

    #[test]
    fn platform_filter() {
        let ctx = ParserContext::new(Some(PlatformKey::SpringBoot));
        assert!(ctx.is_active(&platform_block("java, springboot")));
        assert!(!ctx.is_active(&platform_block("cpp")));
        assert!(ctx.is_active(&AnnotationBlock::default()));

        let any = ParserContext::new(None);
        assert!(any.is_active(&platform_block("cpp")));
    }

    #[test]
    fn node_ids_are_unique_until_cleared() {
        let mut ctx = ParserContext::new(None);
        assert_eq!(ctx.next_node_id(), NodeId(0));
        assert_eq!(ctx.next_node_id(), NodeId(1));
        ctx.clear();
        assert_eq!(ctx.next_node_id(), NodeId(0));
    }

    #[test]
    fn import_lookup_order() {
        let project = tempfile::tempdir().unwrap();
        let builtin_a = tempfile::tempdir().unwrap();
        let builtin_b = tempfile::tempdir().unwrap();
        fs::write(project.path().join("local.jssp"), "").unwrap();
        fs::create_dir_all(builtin_a.path().join("std")).unwrap();
        fs::create_dir_all(builtin_b.path().join("std")).unwrap();
        fs::write(builtin_a.path().join("std/console.jssp"), "").unwrap();
        fs::write(builtin_b.path().join("std/console.jssp"), "").unwrap();
        fs::write(builtin_b.path().join("shared.jssp"), "").unwrap();

        let options = ParserOptions::new(project.path().join("main.jssp")).with_builtin_paths(vec![
            builtin_a.path().to_path_buf(),
            builtin_b.path().to_path_buf(),
        ]);

        let (local, origin) = options.locate_import("local.jssp").unwrap();
        assert_eq!(local, project.path().join("local.jssp"));
        assert_eq!(origin, DocumentOrigin::Project);

        let (std, origin) = options.locate_import("@std/console.jssp").unwrap();
        assert_eq!(std, builtin_a.path().join("std/console.jssp"));
        assert_eq!(origin, DocumentOrigin::Builtin);

        let (fallback, _) = options.locate_import("shared.jssp").unwrap();
        assert_eq!(fallback, builtin_b.path().join("shared.jssp"));

        assert!(options.locate_import("missing.jssp").is_none());
    }
}
