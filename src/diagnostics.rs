//! Diagnostics collected across parsing, resolution, lowering and generation.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::dsl::token::Position;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// Stable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    // =========================================================================
    // Front end
    // =========================================================================
    Syntax,
    Validation,
    ImportCycle,
    ImportNotFound,
    DuplicateSymbol,
    UnresolvedSymbol,
    KindMismatch,

    // =========================================================================
    // Lowering
    // =========================================================================
    UnboundParameter,
    UnusedParameter,
    UnknownColumn,
    DuplicateRoute,
    PlatformUnsupported,

    // =========================================================================
    // Generation and output
    // =========================================================================
    GenerationService,
    FileSkipped,
    Io,
    Config,
    BuildFailed,
    Cancelled,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "E0001",
            Self::Validation => "E0002",
            Self::ImportCycle => "E0101",
            Self::ImportNotFound => "E0102",
            Self::DuplicateSymbol => "E0201",
            Self::UnresolvedSymbol => "E0202",
            Self::KindMismatch => "E0203",
            Self::UnboundParameter => "E0301",
            Self::UnusedParameter => "W0302",
            Self::UnknownColumn => "W0303",
            Self::DuplicateRoute => "E0304",
            Self::PlatformUnsupported => "P0401",
            Self::GenerationService => "E0501",
            Self::FileSkipped => "W0601",
            Self::Io => "E0602",
            Self::Config => "E0603",
            Self::BuildFailed => "E0604",
            Self::Cancelled => "E0701",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub file: Option<PathBuf>,
    pub pos: Option<Position>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            file: None,
            pos: None,
            message: message.into(),
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn at(mut self, file: &Path, pos: Position) -> Self {
        self.file = Some(file.to_path_buf());
        self.pos = Some(pos);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}[{}]", self.code)?;
        match (&self.file, self.pos) {
            (Some(file), Some(pos)) => write!(f, " {}:{pos}", file.display())?,
            (Some(file), None) => write!(f, " {}", file.display())?,
            _ => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered diagnostics sink.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::debug!(code = %diagnostic.code, "{}", diagnostic.message),
            Severity::Warning => tracing::warn!(code = %diagnostic.code, "{}", diagnostic.message),
        }
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in other {
            self.push(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.len() - self.error_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Whether any diagnostic carries `code`.
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut sink = Diagnostics::new();
        sink.push(Diagnostic::error(DiagnosticCode::Syntax, "bad"));
        sink.push(Diagnostic::warning(DiagnosticCode::UnusedParameter, "unused"));
        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.contains(DiagnosticCode::UnusedParameter));
    }

    #[test]
    fn display_includes_code_and_location() {
        let d = Diagnostic::error(DiagnosticCode::UnresolvedSymbol, "unresolved symbol 'Foo'")
            .at(Path::new("main.jssp"), Position::new(3, 7));
        assert_eq!(
            d.to_string(),
            "error[E0202] main.jssp:3:7: unresolved symbol 'Foo'"
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(DiagnosticCode::UnboundParameter.as_str(), "E0301");
        assert_eq!(DiagnosticCode::ImportCycle.as_str(), "E0101");
    }
}
