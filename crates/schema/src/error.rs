use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table {0:?} not found")]
    TableNotFound(String),
    #[error("table {0:?} already exists")]
    TableExists(String),
    #[error("column {0:?} not found")]
    ColumnNotFound(String),
    #[error("index {0:?} already exists")]
    IndexExists(String),
    #[error("index {0:?} not found")]
    IndexNotFound(String),
    #[error("view {0:?} already exists")]
    ViewExists(String),
    #[error("view {0:?} not found")]
    ViewNotFound(String),
    #[error("trigger {0:?} already exists")]
    TriggerExists(String),
    #[error("trigger {0:?} not found")]
    TriggerNotFound(String),
    #[error("procedure {0:?} already exists")]
    ProcedureExists(String),
    #[error("procedure {0:?} not found")]
    ProcedureNotFound(String),
}
