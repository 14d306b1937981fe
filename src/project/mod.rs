//! Rendering a code model into files and writing them to disk.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::build::CodeModel;
use crate::config::ProjectConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::pipeline::BuildError;
use crate::platform::{GeneratedFile, PlatformKey, Registry};
use crate::prompt::{parse_file_blocks, GenerationService, PromptBuilder};

/// Directory under the output root holding bookkeeping files.
pub const STATE_DIR: &str = ".coders";

/// Manifest of the files a previous build wrote.
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Turns a code model into project files.
pub trait Renderer {
    fn render(&self, model: &CodeModel, project: &ProjectConfig)
        -> Result<Vec<GeneratedFile>, BuildError>;
}

/// Deterministic rendering through the platform generators.
pub struct TemplateRenderer<'a> {
    registry: &'a Registry,
    platform: PlatformKey,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(registry: &'a Registry, platform: PlatformKey) -> Self {
        Self { registry, platform }
    }
}

impl Renderer for TemplateRenderer<'_> {
    fn render(
        &self,
        model: &CodeModel,
        project: &ProjectConfig,
    ) -> Result<Vec<GeneratedFile>, BuildError> {
        let generator = self.registry.get(self.platform)?;
        let files = generator.generate(model, project);
        tracing::debug!(platform = %self.platform, files = files.len(), "rendered templates");
        Ok(files)
    }
}

/// Rendering through prompts sent to a generation service.
pub struct PromptRenderer<'a> {
    service: &'a dyn GenerationService,
    platform: PlatformKey,
}

impl<'a> PromptRenderer<'a> {
    pub fn new(service: &'a dyn GenerationService, platform: PlatformKey) -> Self {
        Self { service, platform }
    }
}

impl Renderer for PromptRenderer<'_> {
    /// Prompts are sent in order; a path produced twice keeps its first
    /// contents.
    fn render(
        &self,
        model: &CodeModel,
        project: &ProjectConfig,
    ) -> Result<Vec<GeneratedFile>, BuildError> {
        let prompts = PromptBuilder::new(self.platform, project).build(model)?;
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        for prompt in &prompts {
            let reply = self.service.generate(prompt)?;
            for file in parse_file_blocks(&reply)? {
                if seen.insert(file.path.clone()) {
                    files.push(file);
                } else {
                    tracing::warn!(prompt = %prompt.id, path = %file.path.display(), "duplicate file ignored");
                }
            }
        }
        Ok(files)
    }
}

// =============================================================================
// Writing
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    pub generator: String,
    pub platform: String,
    /// Relative paths with `/` separators, sorted.
    pub files: BTreeSet<String>,
}

impl Manifest {
    pub fn path(out: &Path) -> PathBuf {
        out.join(STATE_DIR).join(MANIFEST_FILE)
    }

    /// Previous manifest; empty when there is none or it cannot be read.
    pub fn load(out: &Path) -> Self {
        let path = Self::path(out);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_yaml::from_str(&content) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable manifest: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self, out: &Path) -> Result<(), BuildError> {
        let path = Self::path(out);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        }
        let text = serde_yaml::to_string(self).map_err(|source| BuildError::Manifest {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, text).map_err(|e| BuildError::io(&path, e))
    }
}

fn manifest_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_relative_inside(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Outcome of writing one project.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Writes generated files under an output root.
///
/// Files listed in the previous manifest belong to the generator and are
/// replaced freely. Any other existing file is left alone unless overwriting
/// is enabled. Nothing is ever deleted.
pub struct ProjectBuilder {
    out: PathBuf,
    platform: PlatformKey,
    overwrite: bool,
}

impl ProjectBuilder {
    pub fn new(out: impl Into<PathBuf>, platform: PlatformKey) -> Self {
        Self {
            out: out.into(),
            platform,
            overwrite: false,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn write(&self, files: &[GeneratedFile]) -> Result<WriteReport, BuildError> {
        std::fs::create_dir_all(&self.out).map_err(|e| BuildError::io(&self.out, e))?;
        let previous = Manifest::load(&self.out);
        let mut report = WriteReport::default();
        let mut owned: BTreeSet<String> = previous
            .files
            .iter()
            .filter(|key| self.out.join(key.as_str()).is_file())
            .cloned()
            .collect();

        for file in files {
            let target = self.out.join(&file.path);
            if !is_relative_inside(&file.path) {
                report.diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::FileSkipped,
                    format!("refusing to write outside the output root: {}", file.path.display()),
                ));
                report.skipped.push(target);
                continue;
            }

            let key = manifest_key(&file.path);
            if target.exists() && !previous.files.contains(&key) && !self.overwrite {
                report.diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::FileSkipped,
                    format!(
                        "{} exists and was not generated by coders; use --overwrite to replace it",
                        target.display()
                    ),
                ));
                report.skipped.push(target);
                continue;
            }

            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
            }
            let unchanged = std::fs::read_to_string(&target).is_ok_and(|old| old == file.contents);
            if !unchanged {
                std::fs::write(&target, &file.contents).map_err(|e| BuildError::io(&target, e))?;
            }
            tracing::debug!(path = %target.display(), unchanged, "wrote file");
            owned.insert(key);
            report.written.push(target);
        }

        Manifest {
            generator: format!("coders {}", env!("CARGO_PKG_VERSION")),
            platform: self.platform.as_str().to_string(),
            files: owned,
        }
        .save(&self.out)?;

        tracing::info!(
            out = %self.out.display(),
            written = report.written.len(),
            skipped = report.skipped.len(),
            "project written"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{Prompt, ServiceError};
    use std::fs;

    fn files() -> Vec<GeneratedFile> {
        vec![
            GeneratedFile::new("src/main.txt", "main\n"),
            GeneratedFile::new("README.md", "generated\n"),
        ]
    }

    #[test]
    fn writes_files_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let report = ProjectBuilder::new(dir.path(), PlatformKey::Java)
            .write(&files())
            .unwrap();
        assert_eq!(report.written.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("src/main.txt")).unwrap(),
            "main\n"
        );
        let manifest = Manifest::load(dir.path());
        assert!(manifest.files.contains("src/main.txt"));
        assert_eq!(manifest.platform, "java");
    }

    #[test]
    fn foreign_files_are_skipped_unless_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "mine\n").unwrap();

        let report = ProjectBuilder::new(dir.path(), PlatformKey::Java)
            .write(&files())
            .unwrap();
        assert_eq!(report.skipped, vec![dir.path().join("README.md")]);
        assert_eq!(report.diagnostics[0].code, DiagnosticCode::FileSkipped);
        assert_eq!(
            fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "mine\n"
        );

        ProjectBuilder::new(dir.path(), PlatformKey::Java)
            .overwrite(true)
            .write(&files())
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "generated\n"
        );
    }

    #[test]
    fn own_files_are_replaced_and_others_kept() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ProjectBuilder::new(dir.path(), PlatformKey::Java);
        builder.write(&files()).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep\n").unwrap();

        let report = builder
            .write(&[GeneratedFile::new("src/main.txt", "changed\n")])
            .unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("src/main.txt")).unwrap(),
            "changed\n"
        );
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("README.md").exists());
        assert!(Manifest::load(dir.path()).files.contains("README.md"));
    }

    struct Scripted;

    impl GenerationService for Scripted {
        fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError> {
            let own = prompt.id.replace(':', "_");
            Ok(format!(
                "```file:{own}.txt\n{id}\n```\n```file:shared.txt\nfrom {id}\n```\n",
                id = prompt.id
            ))
        }
    }

    #[test]
    fn prompt_renderer_collects_blocks_first_wins() {
        let mut compiler = crate::dsl::Compiler::new(Some(PlatformKey::Python));
        compiler
            .compile_str("struct Point { x int; y int; }", "p.jssp")
            .unwrap();
        let model = crate::build::lower(&mut compiler).unwrap();
        let project = ProjectConfig::new("geo", PlatformKey::Python, "out");
        let files = PromptRenderer::new(&Scripted, PlatformKey::Python)
            .render(&model, &project)
            .unwrap();
        let paths: Vec<String> = files.iter().map(|f| manifest_key(&f.path)).collect();
        assert_eq!(paths, vec!["data_Point.txt", "shared.txt", "manifest.txt"]);
        assert_eq!(files[1].contents, "from data:Point\n");
    }
}
