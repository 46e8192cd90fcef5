use thiserror::Error;

use crate::token::Position;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at line {line}, column {column}")]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl LexError {
    pub(crate) fn at(position: Position, message: impl Into<String>) -> LexError {
        LexError { message: message.into(), line: position.line, column: position.column }
    }
}
