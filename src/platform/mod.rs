//! Target platforms and the deterministic template generators.
//!
//! Every [`PlatformKey`] maps to one [`PlatformGenerator`] that turns a
//! [`CodeModel`] into a set of project files. Generators never fail: anything
//! the model carries that a platform cannot express was already filtered out
//! during lowering.

pub mod cpp;
pub mod dart;
pub mod dialect;
pub mod dotnet;
pub mod golang;
pub mod jvm;
pub mod naming;
pub mod node;
pub mod python;
pub mod rustlang;
pub mod web;
pub mod writer;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::build::CodeModel;
use crate::config::ProjectConfig;
use crate::dsl::error::CompileError;

/// Every supported target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformKey {
    Cpp,
    CppServer,
    Java,
    SpringBoot,
    /// Java flavor with a forced `com.coders.<projectId>` package.
    Coders,
    Kotlin,
    CSharp,
    AspNet,
    Go,
    Gin,
    Rust,
    Axum,
    Python,
    FastApi,
    JavaScript,
    Express,
    TypeScript,
    Dart,
    Flutter,
    VueJs,
    React,
}

/// Construct categories a platform may or may not generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Data,
    Mapper,
    Controller,
    Api,
    Page,
    Func,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformGroup {
    /// Native programs and client libraries.
    Client,
    Server,
    /// UI applications with pages.
    Frontend,
}

impl PlatformKey {
    pub const ALL: [PlatformKey; 21] = [
        Self::Cpp,
        Self::CppServer,
        Self::Java,
        Self::SpringBoot,
        Self::Coders,
        Self::Kotlin,
        Self::CSharp,
        Self::AspNet,
        Self::Go,
        Self::Gin,
        Self::Rust,
        Self::Axum,
        Self::Python,
        Self::FastApi,
        Self::JavaScript,
        Self::Express,
        Self::TypeScript,
        Self::Dart,
        Self::Flutter,
        Self::VueJs,
        Self::React,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::CppServer => "cppserver",
            Self::Java => "java",
            Self::SpringBoot => "springboot",
            Self::Coders => "coders",
            Self::Kotlin => "kotlin",
            Self::CSharp => "csharp",
            Self::AspNet => "aspnet",
            Self::Go => "go",
            Self::Gin => "gin",
            Self::Rust => "rust",
            Self::Axum => "axum",
            Self::Python => "python",
            Self::FastApi => "fastapi",
            Self::JavaScript => "javascript",
            Self::Express => "express",
            Self::TypeScript => "typescript",
            Self::Dart => "dart",
            Self::Flutter => "flutter",
            Self::VueJs => "vuejs",
            Self::React => "react",
        }
    }

    pub fn group(self) -> PlatformGroup {
        match self {
            Self::CppServer
            | Self::SpringBoot
            | Self::AspNet
            | Self::Gin
            | Self::Axum
            | Self::FastApi
            | Self::Express => PlatformGroup::Server,
            Self::Flutter | Self::VueJs | Self::React => PlatformGroup::Frontend,
            _ => PlatformGroup::Client,
        }
    }

    pub fn supports(self, category: Category) -> bool {
        match category {
            Category::Data | Category::Func | Category::Property => true,
            Category::Mapper | Category::Controller => self.group() == PlatformGroup::Server,
            Category::Api => self.group() != PlatformGroup::Server,
            Category::Page => self.group() == PlatformGroup::Frontend,
        }
    }

    /// Implementation language, as named to humans.
    pub fn language(self) -> &'static str {
        match self {
            Self::Cpp | Self::CppServer => "C++",
            Self::Java | Self::SpringBoot | Self::Coders => "Java",
            Self::Kotlin => "Kotlin",
            Self::CSharp | Self::AspNet => "C#",
            Self::Go | Self::Gin => "Go",
            Self::Rust | Self::Axum => "Rust",
            Self::Python | Self::FastApi => "Python",
            Self::JavaScript | Self::Express => "JavaScript",
            Self::TypeScript | Self::VueJs | Self::React => "TypeScript",
            Self::Dart | Self::Flutter => "Dart",
        }
    }

    /// Framework the generated project is built on, if any.
    pub fn framework(self) -> Option<&'static str> {
        let name = match self {
            Self::CppServer => "Crow",
            Self::SpringBoot => "Spring Boot",
            Self::AspNet => "ASP.NET Core",
            Self::Gin => "Gin",
            Self::Axum => "Axum",
            Self::FastApi => "FastAPI",
            Self::Express => "Express",
            Self::Flutter => "Flutter",
            Self::VueJs => "Vue 3",
            Self::React => "React",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKey {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CompileError::PlatformUnsupported {
                platform: wanted.to_string(),
                construct: "code generation".to_string(),
            })
    }
}

/// One file of a generated project, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub contents: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Deterministic code generator for one platform.
pub trait PlatformGenerator: Send + Sync {
    fn key(&self) -> PlatformKey;

    /// Render the whole project. Same model and project, same files.
    fn generate(&self, model: &CodeModel, project: &ProjectConfig) -> Vec<GeneratedFile>;
}

/// Generators indexed by platform key.
pub struct Registry {
    index: HashMap<PlatformKey, usize>,
    generators: Vec<Box<dyn PlatformGenerator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            generators: Vec::new(),
        }
    }

    /// Registry with a generator for every platform key.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for key in PlatformKey::ALL {
            let generator: Box<dyn PlatformGenerator> = match key {
                PlatformKey::Cpp => Box::new(cpp::CppClient),
                PlatformKey::CppServer => Box::new(cpp::CppServer),
                PlatformKey::Java | PlatformKey::Coders => Box::new(jvm::JavaClient::new(key)),
                PlatformKey::SpringBoot => Box::new(jvm::SpringBoot),
                PlatformKey::Kotlin => Box::new(jvm::Kotlin),
                PlatformKey::CSharp => Box::new(dotnet::CSharpClient),
                PlatformKey::AspNet => Box::new(dotnet::AspNet),
                PlatformKey::Go => Box::new(golang::GoClient),
                PlatformKey::Gin => Box::new(golang::Gin),
                PlatformKey::Rust => Box::new(rustlang::RustClient),
                PlatformKey::Axum => Box::new(rustlang::Axum),
                PlatformKey::Python => Box::new(python::PythonClient),
                PlatformKey::FastApi => Box::new(python::FastApi),
                PlatformKey::JavaScript | PlatformKey::TypeScript => {
                    Box::new(node::NodeClient::new(key))
                }
                PlatformKey::Express => Box::new(node::Express),
                PlatformKey::Dart => Box::new(dart::DartClient),
                PlatformKey::Flutter => Box::new(dart::Flutter),
                PlatformKey::VueJs => Box::new(web::Vue),
                PlatformKey::React => Box::new(web::React),
            };
            registry.register(generator);
        }
        registry
    }

    /// Add a generator; a later one replaces an earlier one with the same key.
    pub fn register(&mut self, generator: Box<dyn PlatformGenerator>) {
        let key = generator.key();
        match self.index.get(&key) {
            Some(&slot) => self.generators[slot] = generator,
            None => {
                self.index.insert(key, self.generators.len());
                self.generators.push(generator);
            }
        }
    }

    pub fn get(&self, key: PlatformKey) -> Result<&dyn PlatformGenerator, CompileError> {
        self.index
            .get(&key)
            .map(|&slot| self.generators[slot].as_ref())
            .ok_or_else(|| CompileError::PlatformUnsupported {
                platform: key.as_str().to_string(),
                construct: "template generation".to_string(),
            })
    }

    /// Look a generator up by its textual key.
    pub fn lookup(&self, name: &str) -> Result<&dyn PlatformGenerator, CompileError> {
        self.get(name.parse()?)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_text() {
        for key in PlatformKey::ALL {
            assert_eq!(key.as_str().parse::<PlatformKey>().unwrap(), key);
        }
        assert_eq!("SpringBoot".parse::<PlatformKey>().unwrap(), PlatformKey::SpringBoot);
    }

    #[test]
    fn unknown_key_is_unsupported() {
        let err = "cobol".parse::<PlatformKey>().unwrap_err();
        assert!(matches!(err, CompileError::PlatformUnsupported { .. }));
        assert!(Registry::builtin().lookup("cobol").is_err());
    }

    #[test]
    fn capability_groups() {
        assert!(PlatformKey::SpringBoot.supports(Category::Mapper));
        assert!(!PlatformKey::SpringBoot.supports(Category::Api));
        assert!(PlatformKey::Cpp.supports(Category::Api));
        assert!(!PlatformKey::Cpp.supports(Category::Controller));
        assert!(PlatformKey::React.supports(Category::Page));
        assert!(!PlatformKey::Go.supports(Category::Page));
    }

    #[test]
    fn builtin_registry_covers_every_key() {
        let registry = Registry::builtin();
        assert_eq!(registry.len(), PlatformKey::ALL.len());
        for key in PlatformKey::ALL {
            assert_eq!(registry.get(key).unwrap().key(), key);
        }
    }

    #[test]
    fn register_replaces_same_key() {
        let mut registry = Registry::builtin();
        registry.register(Box::new(cpp::CppClient));
        assert_eq!(registry.len(), PlatformKey::ALL.len());
    }
}
