//! Error taxonomy (§7) and the crate-level umbrella that aggregates every
//! component's error enum behind `#[from]` so call sites can use `?`
//! regardless of which layer raised the failure.

use relite_sats::CodecError;
use relite_schema::SchemaError;
use relite_sql_parser::ParseError;
use relite_txn::TxnError;
use thiserror::Error;

/// UNIQUE, CHECK, FOREIGN KEY, NOT NULL violations (§7 "Constraint").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("UNIQUE constraint violated on column {column:?} of table {table:?}")]
    UniqueViolation { table: String, column: String },
    #[error("CHECK constraint violated on column {column:?} of table {table:?}")]
    CheckViolation { table: String, column: String },
    #[error("NOT NULL constraint violated on column {column:?} of table {table:?}")]
    NotNullViolation { table: String, column: String },
    #[error("FOREIGN KEY constraint violated: {local_table}.{local_column} references {ref_table}.{ref_column}")]
    ForeignKeyViolation { local_table: String, local_column: String, ref_table: String, ref_column: String },
}

/// Failures raised while evaluating expressions or dispatching statements
/// (§7 "Execution").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("unsupported operator in this context: {0}")]
    UnsupportedOperator(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("placeholder ?{index} out of range: only {supplied} argument(s) supplied")]
    PlaceholderOutOfRange { index: usize, supplied: usize },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("BEGIN/COMMIT/ROLLBACK must be issued through the transaction API, not Exec/Query")]
    TransactionViaExec,
    #[error("destination count {destinations} does not match column count {columns}")]
    ScanArityMismatch { destinations: usize, columns: usize },
    #[error("unsupported scan coercion for column {0:?}")]
    UnsupportedScanCoercion(String),
    #[error("query returned no rows")]
    NoRows,
}

/// Failures talking to the backend or WAL (§7 "Storage").
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write-ahead log error: {0}")]
    Wal(#[from] relite_wal::WalError),
    #[error("corrupt meta page: {0}")]
    CorruptMetaPage(String),
    #[error("corrupt persisted state: {0}")]
    Corrupt(String),
    #[error("short read: expected {expected} bytes, found {found}")]
    ShortRead { expected: usize, found: usize },
    #[error("schema persistence error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Database handle lifecycle failures (§7 "Lifecycle").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("database is closed")]
    DatabaseClosed,
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// The umbrella error every public entry point in this crate returns.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Transaction(#[from] TxnError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Map(#[from] relite_ordmap::MapError),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> EngineError {
        EngineError::Storage(StorageError::Io(e))
    }
}

impl From<relite_wal::WalError> for EngineError {
    fn from(e: relite_wal::WalError) -> EngineError {
        EngineError::Storage(StorageError::Wal(e))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> EngineError {
        EngineError::Storage(StorageError::Serde(e))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
