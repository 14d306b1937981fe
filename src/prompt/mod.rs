//! Prompt construction for the generation-service engine.
//!
//! The code model is cut into units (one per data type, mapper, service,
//! client and page, plus one for free functions) and a project manifest.
//! Each unit becomes one [`Prompt`]. Construction is deterministic: the same
//! model and project always yield byte-identical prompts in the same order.

pub mod service;

#[cfg(feature = "llm")]
pub mod http;

use serde::Serialize;

use crate::build::{CodeModel, Constant, DataKind, Procedure};
use crate::config::ProjectConfig;
use crate::platform::PlatformKey;

pub use service::{parse_file_blocks, GenerationService, ServiceError, UnavailableService};

/// Opening fence of one generated file in a service reply.
pub const FILE_FENCE: &str = "```file:";

/// A request to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Stable identifier, e.g. `data:tb_user` or `manifest`.
    pub id: String,
    pub system: String,
    pub user: String,
}

#[derive(Serialize)]
struct Target<'a> {
    platform: &'a str,
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    framework: Option<&'a str>,
    project: &'a str,
    name: &'a str,
    version: &'a str,
    package: String,
    namespace: String,
    module: String,
    main_class: String,
    options: &'a crate::config::ProjectOption,
}

#[derive(Serialize)]
struct FunctionsUnit<'a> {
    constants: &'a [Constant],
    procedures: &'a [Procedure],
}

#[derive(Serialize)]
struct Manifest<'a> {
    units: Vec<&'a str>,
    entry_point: bool,
}

pub struct PromptBuilder<'a> {
    platform: PlatformKey,
    project: &'a ProjectConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(platform: PlatformKey, project: &'a ProjectConfig) -> Self {
        Self { platform, project }
    }

    fn system(&self) -> String {
        let stack = match self.platform.framework() {
            Some(framework) => format!("{} ({framework})", self.platform.language()),
            None => self.platform.language().to_string(),
        };
        format!(
            "You are a code generator for {stack} projects. Produce complete, compilable source \
             files only. Reply with one fenced block per file, opened by {FILE_FENCE}<relative path> \
             and closed by ```. Paths are relative to the project root. Write no prose outside \
             the blocks."
        )
    }

    fn target(&self) -> Result<String, ServiceError> {
        let project = self.project;
        let target = Target {
            platform: self.platform.as_str(),
            language: self.platform.language(),
            framework: self.platform.framework(),
            project: project.label(),
            name: &project.name,
            version: project.version(),
            package: project.package(),
            namespace: project.namespace(),
            module: project.module(),
            main_class: project.main_class(),
            options: &project.options,
        };
        Ok(serde_yaml::to_string(&target)?)
    }

    fn prompt<T: Serialize>(
        &self,
        id: String,
        task: &str,
        definition: &T,
        known_types: &[&str],
    ) -> Result<Prompt, ServiceError> {
        let mut user = String::new();
        user.push_str("# Target\n\n```yaml\n");
        user.push_str(&self.target()?);
        user.push_str("```\n\n# Task\n\n");
        user.push_str(task);
        user.push_str("\n\n# Definition\n\n```yaml\n");
        user.push_str(&serde_yaml::to_string(definition)?);
        user.push_str("```\n");
        if !known_types.is_empty() {
            user.push_str("\n# Types defined elsewhere in the project\n\n");
            for name in known_types {
                user.push_str("- ");
                user.push_str(name);
                user.push('\n');
            }
        }
        user.push_str("\n# Output\n\n");
        user.push_str(FILE_FENCE);
        user.push_str("<relative path>\n<file contents>\n```\n");
        Ok(Prompt {
            id,
            system: self.system(),
            user,
        })
    }

    /// One prompt per model unit, then the manifest prompt.
    pub fn build(&self, model: &CodeModel) -> Result<Vec<Prompt>, ServiceError> {
        let record_names: Vec<&str> = model.records().map(|t| t.name.as_str()).collect();
        let mut prompts = Vec::new();
        let mut units = Vec::new();

        for data in model.records() {
            let what = match data.kind {
                DataKind::Table => "the record type mirroring table",
                DataKind::Entity => "the entity type",
                DataKind::QueryResult => "the query result type",
                _ => "the data type",
            };
            let others: Vec<&str> = record_names
                .iter()
                .copied()
                .filter(|n| *n != data.name)
                .collect();
            let id = format!("data:{}", data.name);
            prompts.push(self.prompt(
                id.clone(),
                &format!("Generate {what} `{}`.", data.name),
                data,
                &others,
            )?);
            units.push(id);
        }
        for mapper in &model.mappers {
            let id = format!("mapper:{}", mapper.name);
            prompts.push(self.prompt(
                id.clone(),
                &format!(
                    "Generate the data-access component `{}` with one method per SQL operation.",
                    mapper.name
                ),
                mapper,
                &record_names,
            )?);
            units.push(id);
        }
        for service in &model.services {
            let id = format!("service:{}", service.name);
            prompts.push(self.prompt(
                id.clone(),
                &format!(
                    "Generate the HTTP controller `{}` serving every route below.",
                    service.name
                ),
                service,
                &record_names,
            )?);
            units.push(id);
        }
        for client in &model.clients {
            let id = format!("client:{}", client.name);
            prompts.push(self.prompt(
                id.clone(),
                &format!(
                    "Generate the HTTP client `{}` with one method per call below.",
                    client.name
                ),
                client,
                &record_names,
            )?);
            units.push(id);
        }
        for page in &model.pages {
            let id = format!("page:{}", page.name);
            prompts.push(self.prompt(
                id.clone(),
                &format!("Generate the page component `{}`.", page.name),
                page,
                &record_names,
            )?);
            units.push(id);
        }
        if !model.procedures.is_empty() || !model.constants.is_empty() {
            let id = "functions".to_string();
            let unit = FunctionsUnit {
                constants: &model.constants,
                procedures: &model.procedures,
            };
            prompts.push(self.prompt(
                id.clone(),
                "Generate the constants and functions below. `main` is the program entry point.",
                &unit,
                &record_names,
            )?);
            units.push(id);
        }

        let manifest = Manifest {
            units: units.iter().map(String::as_str).collect(),
            entry_point: model.entry().is_some(),
        };
        prompts.push(self.prompt(
            "manifest".to_string(),
            "Generate the build files, configuration and application entry that tie the units \
             below into one project. Do not regenerate the units themselves.",
            &manifest,
            &[],
        )?);

        tracing::debug!(count = prompts.len(), platform = %self.platform, "built prompts");
        Ok(prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;

    const SRC: &str = "
        table tb_user { id bigint auto; name varchar(100); key(id); }
        mapper UserMapper {
            query selectAll() tb_user { select * from tb_user }
        }
        [baseUrl='/api']
        controller UserController {
            [method=get, route='/users']
            func list() list<tb_user> { return UserMapper.selectAll(); }
        }
        func main() { @console.log('up'); }
    ";

    fn model() -> CodeModel {
        let mut compiler = Compiler::new(Some(PlatformKey::SpringBoot));
        compiler.compile_str(SRC, "prompt.jssp").unwrap();
        crate::build::lower(&mut compiler).unwrap()
    }

    #[test]
    fn one_prompt_per_unit_and_a_manifest() {
        let project = ProjectConfig::new("demo", PlatformKey::SpringBoot, "out");
        let prompts = PromptBuilder::new(PlatformKey::SpringBoot, &project)
            .build(&model())
            .unwrap();
        let ids: Vec<&str> = prompts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "data:tb_user",
                "mapper:UserMapper",
                "service:UserController",
                "functions",
                "manifest"
            ]
        );
        let mapper = &prompts[1];
        assert!(mapper.system.contains("Java (Spring Boot)"));
        assert!(mapper.user.contains("platform: springboot"));
        assert!(mapper.user.contains("select * from tb_user"));
        assert!(mapper.user.contains("- tb_user"));
        assert!(mapper.user.contains(FILE_FENCE));
    }

    #[test]
    fn construction_is_deterministic() {
        let project = ProjectConfig::new("demo", PlatformKey::SpringBoot, "out");
        let builder = PromptBuilder::new(PlatformKey::SpringBoot, &project);
        let first = builder.build(&model()).unwrap();
        let second = builder.build(&model()).unwrap();
        pretty_assertions::assert_eq!(first, second);
    }

    #[test]
    fn nested_types_and_bodies_encode() {
        let src = "
            struct Tagged { name varchar(40); tags list<string>; }
            property limit int = 3;
            func main() {
                var total = 0;
                for (i in 0..limit) { total = total + i; }
                if (total > 2) { @console.log('big', total); }
            }
        ";
        let mut compiler = Compiler::new(Some(PlatformKey::Python));
        compiler.compile_str(src, "/home/someone/work/nested.jssp").unwrap();
        let model = crate::build::lower(&mut compiler).unwrap();
        let project = ProjectConfig::new("nested", PlatformKey::Python, "out");

        let prompts = PromptBuilder::new(PlatformKey::Python, &project)
            .build(&model)
            .unwrap();
        let ids: Vec<&str> = prompts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["data:Tagged", "functions", "manifest"]);

        let data = &prompts[0].user;
        assert!(data.contains("varchar(40)"), "{data}");
        assert!(data.contains("kind: list"), "{data}");
        let functions = &prompts[1].user;
        assert!(functions.contains("kind: for"), "{functions}");
        assert!(functions.contains("kind: range"), "{functions}");
        assert!(prompts.iter().all(|p| !p.user.contains("/home/someone")));
    }
}
