//! Coders: compiles jssp sources into ready-to-build projects.
//!
//! Sources are parsed and scope-resolved (`dsl`, `resolve`), lowered into a
//! platform-neutral code model (`build`), then rendered either by one of the
//! platform generators (`platform`) or through prompts sent to a generation
//! service (`prompt`). `project` writes the result; `pipeline` drives one
//! build and `runner` the CLI commands.

pub mod build;
pub mod config;
pub mod diagnostics;
pub mod dsl;
pub mod pipeline;
pub mod platform;
pub mod project;
pub mod prompt;
pub mod resolve;
pub mod runner;
