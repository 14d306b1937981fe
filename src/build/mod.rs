//! Builder: bound AST → platform-neutral [`CodeModel`].

pub mod lower;
pub mod model;

pub use lower::Builder;
pub use model::*;

use crate::dsl::{CompileError, Compiler};

/// Lower every project document parsed by `compiler` for its target platform.
pub fn lower(compiler: &mut Compiler) -> Result<CodeModel, CompileError> {
    let documents = compiler.project_documents();
    let Compiler {
        context, symbols, ..
    } = compiler;
    Builder::new(symbols, &context.imports, context.platform)
        .lower(&documents, &mut context.diagnostics)
}
