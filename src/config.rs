//! Build configuration: `coders.yaml` plus the optional `~/.coders/llm.yaml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::platform::{naming, PlatformKey};

/// Environment variable that overrides the configured generation-service key.
pub const API_KEY_ENV: &str = "CODERS_LLM_API_KEY";

/// Default configuration file name.
pub const CONFIG_FILE: &str = "coders.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("project '{project}': {reason}")]
    Invalid { project: String, reason: String },

    #[error("no project with id '{0}' in the configuration")]
    UnknownProject(String),

    #[error("no entry file configured for project '{0}'")]
    MissingEntry(String),

    #[error("projects '{first}' and '{second}' share the output directory {}", .path.display())]
    SharedOutPath {
        first: String,
        second: String,
        path: PathBuf,
    },
}

impl ConfigError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(DiagnosticCode::Config, self.to_string())
    }
}

/// Which backend renders the code model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Deterministic template generators.
    #[default]
    Internal,
    /// Prompt builder plus external generation service.
    Llm,
}

/// Generation-service settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmOptions {
    pub provider: String,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: String::new(),
            timeout_secs: 120,
        }
    }
}

impl LlmOptions {
    /// Configured options, else `~/.coders/llm.yaml`, with the API key taken
    /// from the environment when set.
    pub fn resolve(configured: Option<&LlmOptions>) -> Option<LlmOptions> {
        let mut options = configured.cloned().or_else(load_llm_options)?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                options.api_key = key;
            }
        }
        Some(options)
    }
}

fn llm_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".coders").join("llm.yaml"))
}

/// Load `~/.coders/llm.yaml`; `None` when absent or unreadable.
pub fn load_llm_options() -> Option<LlmOptions> {
    let path = llm_config_path()?;
    let content = std::fs::read_to_string(&path).ok()?;
    serde_yaml::from_str(&content).ok()
}

/// Default builtin library root.
pub fn default_builtin_root() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".coders").join("builtin"))
}

/// Per-project generator options. All optional; generators pick defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub use_history: bool,
}

/// One project to generate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub project_id: String,
    pub name: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,
    pub out_path: PathBuf,
    pub overwrite: bool,
    pub options: ProjectOption,
}

impl ProjectConfig {
    pub fn new(project_id: &str, platform: PlatformKey, out_path: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.to_string(),
            name: project_id.to_string(),
            platform: platform.as_str().to_string(),
            out_path: out_path.into(),
            ..Self::default()
        }
    }

    /// Rules a project must pass before it is built.
    pub fn check(&self) -> Result<PlatformKey, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            project: self.label().to_string(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is required"));
        }
        if self.platform.trim().is_empty() {
            return Err(invalid("platform is required"));
        }
        if self.out_path.as_os_str().is_empty() {
            return Err(invalid("outPath is required"));
        }
        self.platform
            .parse::<PlatformKey>()
            .map_err(|_| invalid(&format!("unsupported platform '{}'", self.platform)))
    }

    /// Identifier used in messages.
    pub fn label(&self) -> &str {
        if self.project_id.is_empty() {
            &self.name
        } else {
            &self.project_id
        }
    }

    /// Settings the `coders` platform always uses.
    pub fn apply_platform_overrides(&mut self, platform: PlatformKey) {
        if platform == PlatformKey::Coders {
            self.options.package = Some(format!("com.coders.{}", self.label()));
            self.options.main_class = Some("App".to_string());
            self.options.language = Some("java".to_string());
        }
    }

    pub fn package(&self) -> String {
        self.options.package.clone().unwrap_or_else(|| {
            format!("com.example.{}", naming::snake(self.label()).replace('_', ""))
        })
    }

    pub fn namespace(&self) -> String {
        self.options
            .namespace
            .clone()
            .unwrap_or_else(|| naming::pascal(&self.name))
    }

    pub fn module(&self) -> String {
        self.options
            .module
            .clone()
            .unwrap_or_else(|| naming::kebab(self.label()))
    }

    pub fn main_class(&self) -> String {
        self.options
            .main_class
            .clone()
            .unwrap_or_else(|| "App".to_string())
    }

    pub fn version(&self) -> &str {
        self.options.version.as_deref().unwrap_or("0.1.0")
    }

    pub fn group(&self) -> String {
        self.options.group.clone().unwrap_or_else(|| {
            let package = self.package();
            match package.rsplit_once('.') {
                Some((group, _)) => group.to_string(),
                None => package,
            }
        })
    }

    pub fn description(&self) -> String {
        self.options
            .description
            .clone()
            .unwrap_or_else(|| format!("{} generated by coders", self.name))
    }
}

/// Contents of `coders.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub builtin_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmOptions>,
    pub projects: Vec<ProjectConfig>,
}

impl CodersConfig {
    /// Read a configuration file. Relative paths inside it are taken relative
    /// to the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.anchor(base);
        tracing::debug!(path = %path.display(), projects = config.projects.len(), "loaded configuration");
        Ok(config)
    }

    fn anchor(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        if let Some(entry) = &mut self.entry {
            join(entry);
        }
        self.builtin_paths.iter_mut().for_each(join);
        for project in &mut self.projects {
            if let Some(entry) = &mut project.entry {
                join(entry);
            }
            join(&mut project.out_path);
        }
    }

    /// Builtin search roots: configured ones, else the default root.
    pub fn builtin_roots(&self) -> Vec<PathBuf> {
        if !self.builtin_paths.is_empty() {
            return self.builtin_paths.clone();
        }
        default_builtin_root()
            .filter(|root| root.is_dir())
            .into_iter()
            .collect()
    }

    pub fn project(&self, id: &str) -> Result<&ProjectConfig, ConfigError> {
        self.projects
            .iter()
            .find(|p| p.project_id == id)
            .ok_or_else(|| ConfigError::UnknownProject(id.to_string()))
    }

    /// Entry file of `project`: its own, else the configuration's.
    pub fn entry_for(&self, project: &ProjectConfig) -> Result<PathBuf, ConfigError> {
        project
            .entry
            .clone()
            .or_else(|| self.entry.clone())
            .ok_or_else(|| ConfigError::MissingEntry(project.label().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
entry: src/main.jssp
builtinPaths:
  - lib
llm:
  model: gpt-4o
  timeoutSecs: 30
projects:
  - projectId: demo
    name: Demo
    platform: springboot
    outPath: out/java
    options:
      package: com.example.demo
      useHistory: true
  - projectId: web
    name: Web
    platform: react
    entry: web/main.jssp
    outPath: out/web
"#;

    #[test]
    fn parses_camel_case_keys() {
        let config: CodersConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.projects.len(), 2);
        let demo = &config.projects[0];
        assert_eq!(demo.project_id, "demo");
        assert_eq!(demo.options.package.as_deref(), Some("com.example.demo"));
        assert!(demo.options.use_history);
        let llm = config.llm.unwrap();
        assert_eq!(llm.timeout_secs, 30);
        assert_eq!(llm.provider, "openai");
    }

    #[test]
    fn load_anchors_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = CodersConfig::load(&path).unwrap();
        assert_eq!(config.entry.as_deref(), Some(dir.path().join("src/main.jssp").as_path()));
        assert_eq!(config.builtin_roots(), vec![dir.path().join("lib")]);
        let web = config.project("web").unwrap();
        assert_eq!(config.entry_for(web).unwrap(), dir.path().join("web/main.jssp"));
        let demo = config.project("demo").unwrap();
        assert_eq!(config.entry_for(demo).unwrap(), dir.path().join("src/main.jssp"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CodersConfig::load(Path::new("/no/such/coders.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn check_rules() {
        let ok = ProjectConfig::new("demo", PlatformKey::Go, "out");
        assert_eq!(ok.check().unwrap(), PlatformKey::Go);

        let no_out = ProjectConfig {
            out_path: PathBuf::new(),
            ..ok.clone()
        };
        assert!(matches!(no_out.check(), Err(ConfigError::Invalid { .. })));

        let bad_platform = ProjectConfig {
            platform: "cobol".to_string(),
            ..ok
        };
        let err = bad_platform.check().unwrap_err();
        assert!(err.to_string().contains("unsupported platform"));
    }

    #[test]
    fn coders_platform_forces_java_settings() {
        let mut project = ProjectConfig::new("todo_app", PlatformKey::Coders, "out");
        project.options.package = Some("org.other".to_string());
        project.apply_platform_overrides(PlatformKey::Coders);
        assert_eq!(project.package(), "com.coders.todo_app");
        assert_eq!(project.main_class(), "App");
        assert_eq!(project.options.language.as_deref(), Some("java"));
    }

    #[test]
    fn derived_names() {
        let project = ProjectConfig {
            name: "Todo App".to_string(),
            ..ProjectConfig::new("todo_app", PlatformKey::AspNet, "out")
        };
        assert_eq!(project.namespace(), "TodoApp");
        assert_eq!(project.module(), "todo-app");
        assert_eq!(project.package(), "com.example.todoapp");
        assert_eq!(project.group(), "com.example");
        assert_eq!(project.version(), "0.1.0");
    }
}
