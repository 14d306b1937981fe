//! One build: parse → resolve → lower → generate → write.
//!
//! A build is a strictly forward state machine. Cancellation is observed only
//! between stages; a stage that started always runs to completion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::build;
use crate::config::{ConfigError, Engine, ProjectConfig};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::dsl::{CompileError, Compiler};
use crate::platform::{PlatformKey, Registry};
use crate::project::{ProjectBuilder, PromptRenderer, Renderer, TemplateRenderer};
use crate::prompt::{GenerationService, ServiceError};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("build stopped with {0} error(s)")]
    Failed(usize),

    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Compile(err) => err.to_diagnostic(),
            Self::Service(err) => err.to_diagnostic(),
            Self::Config(err) => err.to_diagnostic(),
            Self::Io { .. } | Self::Manifest { .. } => {
                Diagnostic::error(DiagnosticCode::Io, self.to_string())
            }
            Self::Cancelled => Diagnostic::error(DiagnosticCode::Cancelled, self.to_string()),
            Self::Failed(_) => Diagnostic::error(DiagnosticCode::BuildFailed, self.to_string()),
        }
    }
}

// =============================================================================
// Stages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Idle,
    Parsing,
    Resolving,
    Lowering,
    Generating,
    Writing,
    Done,
    Failed,
}

impl BuildStage {
    /// The stage after this one on the success path.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Parsing),
            Self::Parsing => Some(Self::Resolving),
            Self::Resolving => Some(Self::Lowering),
            Self::Lowering => Some(Self::Generating),
            Self::Generating => Some(Self::Writing),
            Self::Writing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `to` is a legal transition from this stage.
    pub fn can_enter(self, to: BuildStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

/// Shared flag checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Requests and reports
// =============================================================================

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub entry: PathBuf,
    pub builtin_paths: Vec<PathBuf>,
    pub platform: PlatformKey,
    pub engine: Engine,
    pub project: ProjectConfig,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub stage: BuildStage,
    pub generated: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.stage == BuildStage::Done
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

/// Runs builds. Holds what outlives a single build: the generator registry,
/// the optional generation service and the cancel token.
pub struct Pipeline<'a> {
    registry: &'a Registry,
    service: Option<&'a dyn GenerationService>,
    cancel: CancelToken,
}

struct Build {
    stage: BuildStage,
    diagnostics: Diagnostics,
    generated: Vec<PathBuf>,
    skipped: Vec<PathBuf>,
}

impl Build {
    fn enter(&mut self, to: BuildStage) {
        debug_assert!(self.stage.can_enter(to), "{:?} -> {to:?}", self.stage);
        tracing::debug!(from = ?self.stage, to = ?to, "build stage");
        self.stage = to;
    }

    fn fail(&mut self, err: BuildError) {
        self.diagnostics.push(err.to_diagnostic());
        self.enter(BuildStage::Failed);
    }

    fn into_report(self) -> BuildReport {
        BuildReport {
            stage: self.stage,
            generated: self.generated,
            skipped: self.skipped,
            diagnostics: self.diagnostics.into_vec(),
        }
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a Registry, cancel: CancelToken) -> Self {
        Self {
            registry,
            service: None,
            cancel,
        }
    }

    pub fn with_service(mut self, service: &'a dyn GenerationService) -> Self {
        self.service = Some(service);
        self
    }

    fn checkpoint(&self) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run one build to completion. Failures are reported, never returned.
    pub fn run(&self, request: &BuildRequest) -> BuildReport {
        let mut build = Build {
            stage: BuildStage::Idle,
            diagnostics: Diagnostics::new(),
            generated: Vec::new(),
            skipped: Vec::new(),
        };
        let span = tracing::info_span!("build", project = %request.project.label(), platform = %request.platform);
        let _guard = span.enter();

        if let Err(err) = self.stages(request, &mut build) {
            build.fail(err);
        }
        match build.stage {
            BuildStage::Done => tracing::info!(files = build.generated.len(), "build finished"),
            _ => tracing::warn!(errors = build.diagnostics.error_count(), "build failed"),
        }
        build.into_report()
    }

    fn stages(&self, request: &BuildRequest, build: &mut Build) -> Result<(), BuildError> {
        self.checkpoint()?;
        build.enter(BuildStage::Parsing);
        let mut compiler = Compiler::new(Some(request.platform));
        let parsed = compiler.compile_file(&request.entry, &request.builtin_paths);
        build
            .diagnostics
            .extend(std::mem::take(&mut compiler.context.diagnostics).into_vec());
        parsed?;

        self.checkpoint()?;
        build.enter(BuildStage::Resolving);
        if build.diagnostics.has_errors() {
            return Err(BuildError::Failed(build.diagnostics.error_count()));
        }

        self.checkpoint()?;
        build.enter(BuildStage::Lowering);
        let lowered = build::lower(&mut compiler);
        build
            .diagnostics
            .extend(std::mem::take(&mut compiler.context.diagnostics).into_vec());
        let model = lowered?;
        if build.diagnostics.has_errors() {
            return Err(BuildError::Failed(build.diagnostics.error_count()));
        }

        self.checkpoint()?;
        build.enter(BuildStage::Generating);
        let files = match request.engine {
            Engine::Internal => {
                TemplateRenderer::new(self.registry, request.platform).render(&model, &request.project)?
            }
            Engine::Llm => {
                let service = self.service.ok_or_else(|| {
                    ServiceError::Unavailable("no generation service configured".to_string())
                })?;
                PromptRenderer::new(service, request.platform).render(&model, &request.project)?
            }
        };

        self.checkpoint()?;
        build.enter(BuildStage::Writing);
        let written = ProjectBuilder::new(&request.project.out_path, request.platform)
            .overwrite(request.overwrite)
            .write(&files)?;
        build.diagnostics.extend(written.diagnostics);
        build.generated = written.written;
        build.skipped = written.skipped;

        build.enter(BuildStage::Done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_builds_have_their_own_code() {
        let diagnostic = BuildError::Failed(2).to_diagnostic();
        assert_eq!(diagnostic.code, DiagnosticCode::BuildFailed);
        assert_eq!(diagnostic.code.as_str(), "E0604");
        assert!(diagnostic.is_error());
        assert_eq!(
            BuildError::Cancelled.to_diagnostic().code,
            DiagnosticCode::Cancelled
        );
    }

    #[test]
    fn stages_only_move_forward() {
        assert!(BuildStage::Idle.can_enter(BuildStage::Parsing));
        assert!(BuildStage::Lowering.can_enter(BuildStage::Failed));
        assert!(!BuildStage::Lowering.can_enter(BuildStage::Parsing));
        assert!(!BuildStage::Parsing.can_enter(BuildStage::Lowering));
        assert!(!BuildStage::Done.can_enter(BuildStage::Failed));
        assert!(!BuildStage::Failed.can_enter(BuildStage::Parsing));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelled_before_start_fails_without_parsing() {
        let registry = Registry::builtin();
        let cancel = CancelToken::new();
        cancel.cancel();
        let request = BuildRequest {
            entry: PathBuf::from("does-not-exist.jssp"),
            builtin_paths: Vec::new(),
            platform: PlatformKey::Java,
            engine: Engine::Internal,
            project: ProjectConfig::new("x", PlatformKey::Java, "out"),
            overwrite: false,
        };
        let report = Pipeline::new(&registry, cancel).run(&request);
        assert_eq!(report.stage, BuildStage::Failed);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::Cancelled));
    }

    #[test]
    fn missing_entry_is_an_io_failure() {
        let registry = Registry::builtin();
        let request = BuildRequest {
            entry: PathBuf::from("definitely/missing/main.jssp"),
            builtin_paths: Vec::new(),
            platform: PlatformKey::Java,
            engine: Engine::Internal,
            project: ProjectConfig::new("x", PlatformKey::Java, "out"),
            overwrite: false,
        };
        let report = Pipeline::new(&registry, CancelToken::new()).run(&request);
        assert!(!report.succeeded());
        assert!(report.diagnostics.iter().any(|d| d.code == DiagnosticCode::Io));
    }
}
