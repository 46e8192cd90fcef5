use relite_primitives::TxId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxnError {
    #[error("transaction {0} has already committed")]
    AlreadyCommitted(TxId),
    #[error("transaction {0} has already aborted")]
    AlreadyAborted(TxId),
    #[error("transaction {0} conflicts with a concurrently committed write")]
    Conflict(TxId),
    #[error("transaction {0} not found")]
    NotFound(TxId),
}
