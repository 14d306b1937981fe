//! Command implementations behind the CLI: build, check and init.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;

use crate::build;
use crate::config::{CodersConfig, ConfigError, Engine, LlmOptions, ProjectConfig, CONFIG_FILE};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::dsl::Compiler;
use crate::pipeline::{BuildError, BuildReport, BuildRequest, CancelToken, Pipeline};
use crate::platform::{PlatformKey, Registry};
use crate::prompt::{GenerationService, UnavailableService};
use crate::resolve::ImportContext;

/// Options of `coders build`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub config: PathBuf,
    pub project: Option<String>,
    pub engine: Option<Engine>,
    pub overwrite: bool,
}

/// Result of building one configured project.
#[derive(Debug, Clone)]
pub struct ProjectOutcome {
    pub project: String,
    pub platform: PlatformKey,
    pub report: BuildReport,
}

/// Generation service for the LLM engine.
pub fn generation_service(configured: Option<&LlmOptions>) -> Box<dyn GenerationService> {
    let Some(options) = LlmOptions::resolve(configured) else {
        return Box::new(UnavailableService::new(
            "no llm settings in coders.yaml or ~/.coders/llm.yaml",
        ));
    };
    http_service(&options)
}

#[cfg(feature = "llm")]
fn http_service(options: &LlmOptions) -> Box<dyn GenerationService> {
    match crate::prompt::http::HttpGenerationService::new(options) {
        Ok(service) => Box::new(service),
        Err(err) => Box::new(UnavailableService::new(err.to_string())),
    }
}

#[cfg(not(feature = "llm"))]
fn http_service(options: &LlmOptions) -> Box<dyn GenerationService> {
    Box::new(UnavailableService::new(format!(
        "built without the `llm` feature (provider '{}')",
        options.provider
    )))
}

/// Requests for the selected projects. Projects failing the check rules are
/// skipped with a warning, unless one was asked for by id.
fn requests(
    config: &CodersConfig,
    options: &BuildOptions,
) -> Result<Vec<BuildRequest>, ConfigError> {
    let selected: Vec<&ProjectConfig> = match &options.project {
        Some(id) => vec![config.project(id)?],
        None => config.projects.iter().collect(),
    };

    let mut requests = Vec::new();
    for project in selected {
        let platform = match project.check() {
            Ok(platform) => platform,
            Err(err) if options.project.is_none() => {
                tracing::warn!("skipping project: {err}");
                continue;
            }
            Err(err) => return Err(err),
        };
        let entry = match config.entry_for(project) {
            Ok(entry) => entry,
            Err(err) if options.project.is_none() => {
                tracing::warn!("skipping project: {err}");
                continue;
            }
            Err(err) => return Err(err),
        };
        let mut project = project.clone();
        project.apply_platform_overrides(platform);
        requests.push(BuildRequest {
            entry,
            builtin_paths: config.builtin_roots(),
            platform,
            engine: options.engine.unwrap_or_default(),
            overwrite: options.overwrite || project.overwrite,
            project,
        });
    }
    distinct_out_paths(&requests)?;
    Ok(requests)
}

/// Projects build concurrently, so no two may write the same directory.
fn distinct_out_paths(requests: &[BuildRequest]) -> Result<(), ConfigError> {
    let mut seen: HashMap<PathBuf, &str> = HashMap::new();
    for request in requests {
        let path = ImportContext::normalize(&request.project.out_path);
        if let Some(first) = seen.insert(path.clone(), request.project.label()) {
            return Err(ConfigError::SharedOutPath {
                first: first.to_string(),
                second: request.project.label().to_string(),
                path,
            });
        }
    }
    Ok(())
}

/// Build the configured projects, each on its own scoped thread.
pub fn build(
    options: &BuildOptions,
    cancel: &CancelToken,
) -> Result<Vec<ProjectOutcome>, BuildError> {
    let config = CodersConfig::load(&options.config)?;
    let requests = requests(&config, options)?;
    if requests.is_empty() {
        tracing::warn!(config = %options.config.display(), "no project to build");
        return Ok(Vec::new());
    }

    let registry = Registry::builtin();
    let service = generation_service(config.llm.as_ref());
    let service: &dyn GenerationService = service.as_ref();

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .map(|request| {
                let pipeline = Pipeline::new(&registry, cancel.clone()).with_service(service);
                let handle = scope.spawn(move || pipeline.run(request));
                (request, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(request, handle)| {
                let report = handle.join().unwrap_or_else(|_| BuildReport {
                    stage: crate::pipeline::BuildStage::Failed,
                    generated: Vec::new(),
                    skipped: Vec::new(),
                    diagnostics: vec![Diagnostic::error(
                        crate::diagnostics::DiagnosticCode::Io,
                        "build thread panicked",
                    )],
                });
                ProjectOutcome {
                    project: request.project.label().to_string(),
                    platform: request.platform,
                    report,
                }
            })
            .collect()
    });
    Ok(outcomes)
}

/// Parse, resolve and lower `file` for no particular platform.
pub fn check_file(file: &Path, builtin_paths: &[PathBuf]) -> Diagnostics {
    let mut compiler = Compiler::new(None);
    let mut diagnostics = Diagnostics::new();
    let parsed = compiler.compile_file(file, builtin_paths);
    diagnostics.extend(std::mem::take(&mut compiler.context.diagnostics).into_vec());
    if let Err(err) = parsed {
        diagnostics.push(err.to_diagnostic());
        return diagnostics;
    }
    if diagnostics.has_errors() {
        return diagnostics;
    }
    let lowered = build::lower(&mut compiler);
    diagnostics.extend(std::mem::take(&mut compiler.context.diagnostics).into_vec());
    match lowered {
        Ok(model) => tracing::info!(
            file = %file.display(),
            entities = model.entity_count(),
            routes = model.services.iter().map(|s| s.routes.len()).sum::<usize>(),
            "check passed"
        ),
        Err(err) => diagnostics.push(err.to_diagnostic()),
    }
    diagnostics
}

/// `coders check`: an explicit file, else every entry of the configuration.
pub fn check(config_path: &Path, file: Option<&Path>) -> Result<Diagnostics, BuildError> {
    if let Some(file) = file {
        let roots = CodersConfig::load(config_path)
            .map(|c| c.builtin_roots())
            .unwrap_or_default();
        return Ok(check_file(file, &roots));
    }

    let config = CodersConfig::load(config_path)?;
    let mut entries: Vec<PathBuf> = config.entry.iter().cloned().collect();
    for project in &config.projects {
        if let Err(err) = project.check() {
            tracing::warn!("{err}");
        }
        if let Some(entry) = &project.entry {
            if !entries.contains(entry) {
                entries.push(entry.clone());
            }
        }
    }
    if entries.is_empty() {
        return Err(ConfigError::MissingEntry(config_path.display().to_string()).into());
    }

    let roots = config.builtin_roots();
    let mut diagnostics = Diagnostics::new();
    for entry in &entries {
        diagnostics.extend(check_file(entry, &roots).into_vec());
    }
    Ok(diagnostics)
}

// =============================================================================
// init
// =============================================================================

const SAMPLE_CONFIG: &str = r#"# coders build configuration
entry: main.jssp
projects:
  - projectId: server
    name: Server
    platform: springboot
    entry: springboot.jssp
    outPath: out/server
    options:
      package: com.example.server
  - projectId: client
    name: Client
    platform: typescript
    outPath: out/client
"#;

const SAMPLE_SERVER: &str = r#"// Data model and HTTP service.

table tb_user {
    id bigint auto;
    name varchar(100);
    email varchar(200);
    key(id);
}

mapper UserMapper {
    query selectById(id bigint) tb_user {
        select id, name, email from tb_user where id = :id
    }
    query selectAll() list<tb_user> {
        select id, name, email from tb_user
    }
    query insertUser(name varchar(100), email varchar(200)) {
        insert into tb_user (name, email) values (:name, :email)
    }
}

[baseUrl='/api/v1']
controller UserController {
    [method=get, route='/users']
    func listUsers() list<tb_user> {
        return UserMapper.selectAll();
    }

    [method=get, route='/users/{id}']
    func getUser(id bigint) tb_user {
        return UserMapper.selectById(id);
    }
}
"#;

const SAMPLE_MAIN: &str = r#"// Client of the user service.
import './springboot.jssp';

[baseUrl='http://localhost:8080']
api UserApi {
    UserController;
}

property greeting string = 'coders';

func main() {
    for (i in 0..3) {
        @console.log('hello from', greeting, i);
    }
}
"#;

/// Files written by `coders init`.
pub const INIT_FILES: [(&str, &str); 3] = [
    (CONFIG_FILE, SAMPLE_CONFIG),
    ("main.jssp", SAMPLE_MAIN),
    ("springboot.jssp", SAMPLE_SERVER),
];

/// Scaffold a sample configuration and sources in `dir`. Existing files are
/// kept unless `force` is set; the returned paths are those written.
pub fn init(dir: &Path, force: bool) -> Result<Vec<PathBuf>, BuildError> {
    std::fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
    let mut written = Vec::new();
    for (name, contents) in INIT_FILES {
        let path = dir.join(name);
        if path.exists() && !force {
            tracing::warn!(path = %path.display(), "exists, not overwritten (use --force)");
            continue;
        }
        std::fs::write(&path, contents).map_err(|e| BuildError::io(&path, e))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BuildStage;

    #[test]
    fn init_writes_once_without_force() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(init(dir.path(), false).unwrap().len(), 3);
        assert!(init(dir.path(), false).unwrap().is_empty());
        assert_eq!(init(dir.path(), true).unwrap().len(), 3);
    }

    #[test]
    fn scaffold_checks_clean() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let diagnostics = check(&dir.path().join(CONFIG_FILE), None).unwrap();
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.into_vec());
    }

    #[test]
    fn scaffold_builds_every_project() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let options = BuildOptions {
            config: dir.path().join(CONFIG_FILE),
            project: None,
            engine: None,
            overwrite: false,
        };
        let outcomes = build(&options, &CancelToken::new()).unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.report.stage, BuildStage::Done, "{:?}", outcome.report.diagnostics);
            assert!(!outcome.report.generated.is_empty());
        }
        assert!(dir.path().join("out/server/pom.xml").exists());
        assert!(dir.path().join("out/client/src/api.ts").exists());
    }

    #[test]
    fn unknown_project_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let options = BuildOptions {
            config: dir.path().join(CONFIG_FILE),
            project: Some("nope".to_string()),
            engine: None,
            overwrite: false,
        };
        assert!(matches!(
            build(&options, &CancelToken::new()),
            Err(BuildError::Config(ConfigError::UnknownProject(_)))
        ));
    }

    #[test]
    fn llm_engine_without_service_fails_at_generation() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let options = BuildOptions {
            config: dir.path().join(CONFIG_FILE),
            project: Some("server".to_string()),
            engine: Some(Engine::Llm),
            overwrite: false,
        };
        let service = UnavailableService::new("test");
        let config = CodersConfig::load(&options.config).unwrap();
        let request = requests(&config, &options).unwrap().remove(0);
        let registry = Registry::builtin();
        let report = Pipeline::new(&registry, CancelToken::new())
            .with_service(&service)
            .run(&request);
        assert_eq!(report.stage, BuildStage::Failed);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.code == crate::diagnostics::DiagnosticCode::GenerationService));
    }

    #[test]
    fn projects_sharing_an_out_path_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let config = SAMPLE_CONFIG.replace("outPath: out/client", "outPath: out/./server");
        std::fs::write(dir.path().join(CONFIG_FILE), config).unwrap();

        let options = BuildOptions {
            config: dir.path().join(CONFIG_FILE),
            project: None,
            engine: None,
            overwrite: false,
        };
        let err = build(&options, &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Config(ConfigError::SharedOutPath { ref first, ref second, .. })
                if first == "server" && second == "client"
        ));
        assert!(!dir.path().join("out").exists());
    }
}
