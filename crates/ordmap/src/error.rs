use thiserror::Error;

/// Errors raised by the ordered map (§4.1). `put`/`get`/`delete` of an empty
/// key fail with `InvalidKey`; every other operation is total.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("key must be non-empty")]
    InvalidKey,
    #[error("key not found")]
    NotFound,
}
