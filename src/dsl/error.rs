//! Error types for the jssp front end and lowering.

use std::path::PathBuf;

use thiserror::Error;

use super::token::Position;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Severity};

/// An error that occurred while compiling jssp sources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{}:{position}: expected {expected}, found {found}", .file.display())]
    Syntax {
        file: PathBuf,
        position: Position,
        expected: String,
        found: String,
    },

    #[error("{}:{position}: invalid {declaration}: {reason}", .file.display())]
    Validation {
        file: PathBuf,
        position: Position,
        declaration: String,
        reason: String,
    },

    #[error("import cycle: {}", format_chain(.chain))]
    ImportCycle { chain: Vec<PathBuf> },

    #[error("{}:{position}: cannot find import '{path}'", .file.display())]
    ImportNotFound {
        file: PathBuf,
        position: Position,
        path: String,
    },

    #[error("{}:{position}: '{name}' is already declared in this scope (previous declaration at {previous})", .file.display())]
    DuplicateSymbol {
        file: PathBuf,
        position: Position,
        name: String,
        previous: Position,
    },

    #[error("{}:{position}: unresolved symbol '{name}' in {context}", .file.display())]
    UnresolvedSymbol {
        file: PathBuf,
        position: Position,
        name: String,
        context: String,
    },

    #[error("{}:{position}: '{name}' is a {found}, expected {expected}", .file.display())]
    KindMismatch {
        file: PathBuf,
        position: Position,
        name: String,
        expected: String,
        found: String,
    },

    #[error("{}:{position}: '{declaration}' references unbound parameter ':{name}'", .file.display())]
    UnboundParameter {
        file: PathBuf,
        position: Position,
        declaration: String,
        name: String,
    },

    #[error("{}:{position}: parameter '{name}' of '{declaration}' is never used", .file.display())]
    UnusedParameter {
        file: PathBuf,
        position: Position,
        declaration: String,
        name: String,
    },

    #[error("{}:{position}: route {method} {path} is declared more than once", .file.display())]
    DuplicateRoute {
        file: PathBuf,
        position: Position,
        method: String,
        path: String,
    },

    #[error("platform '{platform}' does not support {construct}")]
    PlatformUnsupported { platform: String, construct: String },

    #[error("{}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("build cancelled")]
    Cancelled,
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl CompileError {
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Syntax { .. } => DiagnosticCode::Syntax,
            Self::Validation { .. } => DiagnosticCode::Validation,
            Self::ImportCycle { .. } => DiagnosticCode::ImportCycle,
            Self::ImportNotFound { .. } => DiagnosticCode::ImportNotFound,
            Self::DuplicateSymbol { .. } => DiagnosticCode::DuplicateSymbol,
            Self::UnresolvedSymbol { .. } => DiagnosticCode::UnresolvedSymbol,
            Self::KindMismatch { .. } => DiagnosticCode::KindMismatch,
            Self::UnboundParameter { .. } => DiagnosticCode::UnboundParameter,
            Self::UnusedParameter { .. } => DiagnosticCode::UnusedParameter,
            Self::DuplicateRoute { .. } => DiagnosticCode::DuplicateRoute,
            Self::PlatformUnsupported { .. } => DiagnosticCode::PlatformUnsupported,
            Self::Io { .. } => DiagnosticCode::Io,
            Self::Cancelled => DiagnosticCode::Cancelled,
        }
    }

    /// Unused parameters and skipped constructs are reported but never fatal.
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnusedParameter { .. } | Self::PlatformUnsupported { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    fn location(&self) -> Option<(&PathBuf, Position)> {
        match self {
            Self::Syntax { file, position, .. }
            | Self::Validation { file, position, .. }
            | Self::ImportNotFound { file, position, .. }
            | Self::DuplicateSymbol { file, position, .. }
            | Self::UnresolvedSymbol { file, position, .. }
            | Self::KindMismatch { file, position, .. }
            | Self::UnboundParameter { file, position, .. }
            | Self::UnusedParameter { file, position, .. }
            | Self::DuplicateRoute { file, position, .. } => Some((file, *position)),
            _ => None,
        }
    }

    /// Message without the location prefix carried by `Display`.
    fn message(&self) -> String {
        match self {
            Self::Syntax {
                expected, found, ..
            } => format!("expected {expected}, found {found}"),
            Self::Validation {
                declaration,
                reason,
                ..
            } => format!("invalid {declaration}: {reason}"),
            Self::ImportNotFound { path, .. } => format!("cannot find import '{path}'"),
            Self::DuplicateSymbol { name, previous, .. } => format!(
                "'{name}' is already declared in this scope (previous declaration at {previous})"
            ),
            Self::UnresolvedSymbol { name, context, .. } => {
                format!("unresolved symbol '{name}' in {context}")
            }
            Self::KindMismatch {
                name,
                expected,
                found,
                ..
            } => format!("'{name}' is a {found}, expected {expected}"),
            Self::UnboundParameter {
                declaration, name, ..
            } => format!("'{declaration}' references unbound parameter ':{name}'"),
            Self::UnusedParameter {
                declaration, name, ..
            } => format!("parameter '{name}' of '{declaration}' is never used"),
            Self::DuplicateRoute { method, path, .. } => {
                format!("route {method} {path} is declared more than once")
            }
            other => other.to_string(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic {
            severity: self.severity(),
            code: self.code(),
            file: None,
            pos: None,
            message: self.message(),
        };
        match self.location() {
            Some((file, pos)) => diagnostic.at(file, pos),
            None => match self {
                Self::Io { path, .. } => Diagnostic {
                    file: Some(path.clone()),
                    ..diagnostic
                },
                _ => diagnostic,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display() {
        let err = CompileError::Syntax {
            file: PathBuf::from("a.jssp"),
            position: Position::new(2, 5),
            expected: "';'".to_string(),
            found: "'}'".to_string(),
        };
        assert_eq!(err.to_string(), "a.jssp:2:5: expected ';', found '}'");
    }

    #[test]
    fn cycle_lists_chain() {
        let err = CompileError::ImportCycle {
            chain: vec![PathBuf::from("a.jssp"), PathBuf::from("b.jssp"), PathBuf::from("a.jssp")],
        };
        assert_eq!(err.to_string(), "import cycle: a.jssp -> b.jssp -> a.jssp");
    }

    #[test]
    fn unused_parameter_is_a_warning() {
        let err = CompileError::UnusedParameter {
            file: PathBuf::from("m.jssp"),
            position: Position::new(1, 1),
            declaration: "selectAll".to_string(),
            name: "limit".to_string(),
        };
        let d = err.to_diagnostic();
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.code, DiagnosticCode::UnusedParameter);
        assert_eq!(d.pos, Some(Position::new(1, 1)));
    }
}
