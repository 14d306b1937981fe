//! Builds through the LLM engine with a scripted generation service.

use std::fs;
use std::sync::Mutex;

use pretty_assertions::assert_eq;

use coders::config::{Engine, ProjectConfig};
use coders::diagnostics::DiagnosticCode;
use coders::pipeline::{BuildRequest, BuildStage, CancelToken, Pipeline};
use coders::platform::{PlatformKey, Registry};
use coders::prompt::{GenerationService, Prompt, ServiceError};

const SOURCE: &str = r#"
struct Point { x int; y int; }

[baseUrl='/geo']
controller GeoController {
    [method=get, route='/points/{id}']
    func distance(id int) int {
        return id * 2;
    }
}

func main() { @console.log('geo'); }
"#;

/// Answers each prompt with one file named after the prompt and records the
/// ids it was asked for.
#[derive(Default)]
struct Scripted {
    seen: Mutex<Vec<String>>,
}

impl GenerationService for Scripted {
    fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError> {
        self.seen.lock().unwrap().push(prompt.id.clone());
        let name = prompt.id.replace(':', "/");
        Ok(format!(
            "Sure.\n```file:gen/{name}.txt\n{}\n```\n",
            prompt.user.lines().count()
        ))
    }
}

struct Failing;

impl GenerationService for Failing {
    fn generate(&self, _prompt: &Prompt) -> Result<String, ServiceError> {
        Err(ServiceError::Timeout(30))
    }
}

fn request(dir: &tempfile::TempDir, platform: PlatformKey) -> BuildRequest {
    let entry = dir.path().join("geo.jssp");
    fs::write(&entry, SOURCE).unwrap();
    BuildRequest {
        entry,
        builtin_paths: Vec::new(),
        platform,
        engine: Engine::Llm,
        project: ProjectConfig::new("geo", platform, dir.path().join("out")),
        overwrite: false,
    }
}

#[test]
fn one_prompt_per_unit_then_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(&dir, PlatformKey::FastApi);
    let registry = Registry::builtin();
    let service = Scripted::default();

    let report = Pipeline::new(&registry, CancelToken::new())
        .with_service(&service)
        .run(&request);
    assert_eq!(report.stage, BuildStage::Done, "{:?}", report.diagnostics);

    let seen = service.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            "data:Point".to_string(),
            "service:GeoController".to_string(),
            "functions".to_string(),
            "manifest".to_string(),
        ]
    );
    assert!(dir.path().join("out/gen/manifest.txt").is_file());
    assert!(dir.path().join("out/gen/service/GeoController.txt").is_file());
}

#[test]
fn service_failure_fails_the_build_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(&dir, PlatformKey::Python);
    let registry = Registry::builtin();

    let report = Pipeline::new(&registry, CancelToken::new())
        .with_service(&Failing)
        .run(&request);
    assert_eq!(report.stage, BuildStage::Failed);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::GenerationService));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn llm_engine_without_a_service_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let request = request(&dir, PlatformKey::Go);
    let registry = Registry::builtin();

    let report = Pipeline::new(&registry, CancelToken::new()).run(&request);
    assert!(!report.succeeded());
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::GenerationService));
}
