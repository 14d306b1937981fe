//! The generation-service seam and parsing of its replies.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use super::{Prompt, FILE_FENCE};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::platform::GeneratedFile;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("generation service unreachable: {0}")]
    Transport(String),

    #[error("generation service timed out after {0}s")]
    Timeout(u64),

    #[error("generation service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation-service response: {0}")]
    MalformedResponse(String),

    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("cannot encode prompt: {0}")]
    Encode(#[from] serde_yaml::Error),
}

impl ServiceError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(DiagnosticCode::GenerationService, self.to_string())
    }
}

/// Something that turns a prompt into generated source text.
pub trait GenerationService: Send + Sync {
    fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError>;
}

/// Stand-in used when no service is configured or compiled in.
#[derive(Debug, Clone)]
pub struct UnavailableService {
    reason: String,
}

impl UnavailableService {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl GenerationService for UnavailableService {
    fn generate(&self, _prompt: &Prompt) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable(self.reason.clone()))
    }
}

/// Relative path that stays inside the project root.
fn contained(path: &str) -> Option<PathBuf> {
    let path = Path::new(path);
    let safe = !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    safe.then(|| path.to_path_buf())
}

/// Extract the ```` ```file:<path> ```` blocks of a reply.
pub fn parse_file_blocks(reply: &str) -> Result<Vec<GeneratedFile>, ServiceError> {
    let mut files = Vec::new();
    let mut current: Option<(PathBuf, String)> = None;

    for line in reply.lines() {
        if current.is_some() && line.trim_end() == "```" {
            if let Some((path, contents)) = current.take() {
                files.push(GeneratedFile::new(path, contents));
            }
            continue;
        }
        if let Some((_, contents)) = current.as_mut() {
            contents.push_str(line);
            contents.push('\n');
            continue;
        }
        if let Some(rest) = line.trim_start().strip_prefix(FILE_FENCE) {
            let path = contained(rest.trim()).ok_or_else(|| {
                ServiceError::MalformedResponse(format!("unsafe file path '{}'", rest.trim()))
            })?;
            current = Some((path, String::new()));
        }
    }

    if let Some((path, _)) = current {
        return Err(ServiceError::MalformedResponse(format!(
            "unterminated block for {}",
            path.display()
        )));
    }
    if files.is_empty() {
        return Err(ServiceError::MalformedResponse(
            "reply contains no file blocks".to_string(),
        ));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_blocks_and_ignores_prose() {
        let reply = "Here you go:\n```file:src/a.txt\nline one\nline two\n```\nand\n```file: b/c.txt\n```\n";
        let files = parse_file_blocks(reply).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("src/a.txt"));
        assert_eq!(files[0].contents, "line one\nline two\n");
        assert_eq!(files[1].path, PathBuf::from("b/c.txt"));
        assert_eq!(files[1].contents, "");
    }

    #[test]
    fn rejects_escaping_paths() {
        let err = parse_file_blocks("```file:../etc/passwd\nx\n```\n").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
        let err = parse_file_blocks("```file:/abs\nx\n```\n").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn unterminated_or_empty_replies_are_malformed() {
        assert!(parse_file_blocks("```file:a.txt\nx\n").is_err());
        assert!(parse_file_blocks("no blocks at all").is_err());
    }

    #[test]
    fn unavailable_service_always_fails() {
        let service = UnavailableService::new("feature disabled");
        let prompt = Prompt {
            id: "manifest".to_string(),
            system: String::new(),
            user: String::new(),
        };
        assert!(matches!(
            service.generate(&prompt),
            Err(ServiceError::Unavailable(_))
        ));
    }
}
