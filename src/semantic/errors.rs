//! Semantic-analysis error type (spec §7).

use thiserror::Error;

use crate::ast::Position;

#[derive(Debug, Error)]
#[error("{pos}: {message}")]
pub struct SemanticError {
    pub message: String,
    pub pos: Position,
}

impl SemanticError {
    pub fn new(message: impl Into<String>, pos: Position) -> Self {
        SemanticError {
            message: message.into(),
            pos,
        }
    }
}
