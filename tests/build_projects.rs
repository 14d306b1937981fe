//! End-to-end builds: jssp sources on disk → pipeline → files on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use coders::config::{Engine, ProjectConfig};
use coders::diagnostics::DiagnosticCode;
use coders::pipeline::{BuildReport, BuildRequest, BuildStage, CancelToken, Pipeline};
use coders::platform::{PlatformKey, Registry};
use coders::project::Manifest;

const TODOS: &str = r#"
table tb_todo {
    id bigint auto;
    title varchar(200);
    done bool;
    key(id);
}

mapper TodoMapper {
    query byId(id bigint) tb_todo {
        select id, title, done from tb_todo where id = :id
    }
    query all() list<tb_todo> {
        select id, title, done from tb_todo
    }
}

[baseUrl='/api']
controller TodoController {
    [method=get, route='/todos']
    func listTodos() list<tb_todo> {
        return TodoMapper.all();
    }

    [method=get, route='/todos/{id}']
    func getTodo(id bigint) tb_todo {
        return TodoMapper.byId(id);
    }
}

[baseUrl='http://localhost:8080']
api TodoApi {
    TodoController;
}

struct Summary {
    total int;
    open int;
}

[route='/todos', title='Todos']
html TodoPage { <div class="page"><h1>{{ title }}</h1><button>Reload</button></div> }

property appName string = 'todos';

func main() {
    for (i in 0..2) {
        @console.log(appName, i);
    }
}
"#;

/// Helper: write `files` under a fresh temp dir.
fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn request(entry: PathBuf, platform: PlatformKey, out: PathBuf) -> BuildRequest {
    BuildRequest {
        entry,
        builtin_paths: Vec::new(),
        platform,
        engine: Engine::Internal,
        project: ProjectConfig::new("todos", platform, out),
        overwrite: false,
    }
}

fn run(request: &BuildRequest) -> BuildReport {
    let registry = Registry::builtin();
    Pipeline::new(&registry, CancelToken::new()).run(request)
}

/// Helper: every file under `root` keyed by its relative path.
fn snapshot(root: &Path) -> BTreeMap<String, String> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let key = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                out.insert(key, fs::read_to_string(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn every_platform_builds_the_todo_project() {
    let dir = workspace(&[("todos.jssp", TODOS)]);
    for key in PlatformKey::ALL {
        let out = dir.path().join("out").join(key.as_str());
        let report = run(&request(dir.path().join("todos.jssp"), key, out.clone()));
        assert_eq!(
            report.stage,
            BuildStage::Done,
            "{key}: {:?}",
            report.diagnostics
        );
        assert!(!report.generated.is_empty(), "{key} generated nothing");
        assert!(report.generated.iter().all(|p| p.starts_with(&out)));
        assert!(out.join(".coders/manifest.yaml").is_file());
    }
}

#[test]
fn unsupported_constructs_are_warnings_only() {
    let dir = workspace(&[("todos.jssp", TODOS)]);
    let report = run(&request(
        dir.path().join("todos.jssp"),
        PlatformKey::Java,
        dir.path().join("out"),
    ));
    assert!(report.succeeded());
    assert_eq!(report.error_count(), 0);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::PlatformUnsupported));
}

#[test]
fn generation_is_deterministic() {
    let dir = workspace(&[("todos.jssp", TODOS)]);
    for key in [PlatformKey::SpringBoot, PlatformKey::TypeScript, PlatformKey::Flutter] {
        let first = dir.path().join("first").join(key.as_str());
        let second = dir.path().join("second").join(key.as_str());
        assert!(run(&request(dir.path().join("todos.jssp"), key, first.clone())).succeeded());
        assert!(run(&request(dir.path().join("todos.jssp"), key, second.clone())).succeeded());
        assert_eq!(snapshot(&first), snapshot(&second));
    }
}

#[test]
fn rebuild_replaces_own_files_and_keeps_user_files() {
    let dir = workspace(&[("todos.jssp", TODOS)]);
    let out = dir.path().join("out");
    let req = request(dir.path().join("todos.jssp"), PlatformKey::Python, out.clone());

    let first = run(&req);
    assert!(first.succeeded());
    fs::write(out.join("NOTES.md"), "mine\n").unwrap();

    let second = run(&req);
    assert!(second.succeeded());
    assert!(second.skipped.is_empty());
    assert_eq!(first.generated, second.generated);
    assert_eq!(fs::read_to_string(out.join("NOTES.md")).unwrap(), "mine\n");
}

#[test]
fn imported_declarations_reach_the_model() {
    let dir = workspace(&[
        ("models/user.jssp", "struct User { id int; name string; }"),
        (
            "main.jssp",
            "import './models/user.jssp';\nfunc greet(user User) string { return user.name; }",
        ),
    ]);
    let out = dir.path().join("out");
    let report = run(&request(dir.path().join("main.jssp"), PlatformKey::Python, out.clone()));
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    let models = fs::read_to_string(out.join("src/models.py")).unwrap();
    assert!(models.contains("class User"), "{models}");
}

#[test]
fn missing_import_fails_at_parsing() {
    let dir = workspace(&[("main.jssp", "import './nowhere.jssp';")]);
    let out = dir.path().join("out");
    let report = run(&request(dir.path().join("main.jssp"), PlatformKey::Go, out.clone()));
    assert_eq!(report.stage, BuildStage::Failed);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::ImportNotFound));
    assert!(!out.exists());
}

#[test]
fn undefined_name_stops_before_generation() {
    let dir = workspace(&[("main.jssp", "struct A { b Missing; }")]);
    let out = dir.path().join("out");
    let report = run(&request(dir.path().join("main.jssp"), PlatformKey::Rust, out.clone()));
    assert!(!report.succeeded());
    assert!(report.error_count() > 0);
    assert!(report.generated.is_empty());
    assert!(!out.exists());
}

#[test]
fn import_cycle_writes_nothing() {
    let dir = workspace(&[
        ("a.jssp", "import './b.jssp';\nstruct A { id int; }"),
        ("b.jssp", "import './a.jssp';\nstruct B { id int; }"),
    ]);
    let out = dir.path().join("out");
    let report = run(&request(dir.path().join("a.jssp"), PlatformKey::Java, out.clone()));
    assert_eq!(report.stage, BuildStage::Failed);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::ImportCycle));
    assert!(!out.exists());
}

#[test]
fn fixing_the_source_lets_the_rebuild_write() {
    let table = "table tb_user { id bigint auto; name varchar(100); key(id); }\n";
    let broken = format!(
        "{table}mapper UserMapper {{\n    query selectById() Account {{ select id, name from tb_user where id = :id }}\n}}\nstruct Holder {{ owner Owner; }}\n"
    );
    let dir = workspace(&[("users.jssp", broken.as_str())]);
    let entry = dir.path().join("users.jssp");
    let out = dir.path().join("out");
    let req = request(entry.clone(), PlatformKey::SpringBoot, out.clone());

    let unresolved = run(&req);
    assert_eq!(unresolved.stage, BuildStage::Failed);
    assert!(unresolved
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::UnresolvedSymbol));
    assert!(!out.exists());

    fs::write(
        &entry,
        format!(
            "{table}mapper UserMapper {{\n    query selectById() Account {{ select id, name from tb_user where id = :id }}\n}}\n"
        ),
    )
    .unwrap();
    let unbound = run(&req);
    assert_eq!(unbound.stage, BuildStage::Failed);
    assert!(unbound
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::UnboundParameter));
    assert!(!out.exists());

    fs::write(
        &entry,
        format!(
            "{table}mapper UserMapper {{\n    query selectById(id bigint) Account {{ select id, name from tb_user where id = :id }}\n}}\n"
        ),
    )
    .unwrap();
    let fixed = run(&req);
    assert_eq!(fixed.stage, BuildStage::Done, "{:?}", fixed.diagnostics);
    assert!(!fixed.generated.is_empty());

    let manifest = Manifest::load(&out);
    assert_eq!(manifest.platform, "springboot");
    assert!(manifest.files.contains("pom.xml"));
}
