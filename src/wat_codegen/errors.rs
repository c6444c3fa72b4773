//! Code generator error type (spec §7: "Codegen invariant ... should-not-
//! happen on validated AST").

use thiserror::Error;

use crate::semantic::SemanticError;

#[derive(Debug, Error)]
pub enum CodegenError {
    /// The checker rejected an expression/statement the analyzer already
    /// accepted. Validated input should make this impossible; if it
    /// happens it indicates a compiler bug, not a user error.
    #[error("codegen invariant violated: {0}")]
    Invariant(String),
}

impl From<SemanticError> for CodegenError {
    fn from(e: SemanticError) -> Self {
        CodegenError::Invariant(e.to_string())
    }
}
