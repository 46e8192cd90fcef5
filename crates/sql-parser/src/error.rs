use relite_sql_lexer::LexError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{message} at line {line}, column {column}")]
    Syntax { message: String, line: u32, column: u32 },
}
