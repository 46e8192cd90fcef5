//! `relite`: an embeddable relational database engine.
//!
//! This crate is the front-end façade: [`Db`] and [`Tx`] open, close, and
//! dispatch SQL against the query pipeline, catalog, ordered maps, and
//! write-ahead log assembled from the sibling `relite-*` crates — the
//! single entry point every other subsystem is reached through. No
//! replication, no module host, no subscription machinery: a
//! synchronous, single-node, embeddable engine.
//!
//! ```no_run
//! use relite::{Db, DbOptions, Value};
//!
//! let db = Db::open(":memory:", DbOptions::default()).unwrap();
//! db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
//! db.exec("INSERT INTO t (name) VALUES (?)", &[Value::Text("Ersin".into())]).unwrap();
//! let mut rows = db.query("SELECT id, name FROM t", &[]).unwrap();
//! while rows.next() {
//!     println!("{:?}", rows.row());
//! }
//! ```

mod backend;
mod engine;
pub mod error;
pub mod options;
mod persistence;
mod row;
mod rows;
mod tx;
pub mod wire;

pub use engine::{ExecResult, QueryResult};
pub use error::{EngineError, EngineResult};
pub use options::DbOptions;
pub use relite_sats::Value;
pub use relite_txn::{Isolation, TxOptions};
pub use rows::{Rows, ScanTarget};
pub use tx::Tx;

use std::sync::Arc;

use parking_lot::RwLock;

use engine::Engine;
use error::LifecycleError;

/// The database handle (§6 "Library API"). Cheaply cloneable — every clone
/// shares the same underlying [`Engine`] and closed flag, so a `Db` can be
/// handed to multiple threads the way the reference codebase's `Arc`-shared
/// database handle is.
#[derive(Clone)]
pub struct Db {
    engine: Arc<Engine>,
    closed: Arc<RwLock<bool>>,
}

impl Db {
    /// Opens (or creates) a database at `path`. `path = ":memory:"` selects
    /// the in-memory backend regardless of `options.in_memory` (§6).
    #[tracing::instrument(skip(options))]
    pub fn open(path: &str, options: DbOptions) -> EngineResult<Db> {
        let engine = Engine::open(path, options)?;
        Ok(Db { engine: Arc::new(engine), closed: Arc::new(RwLock::new(false)) })
    }

    /// Executes one mutating statement (INSERT/UPDATE/DELETE/DDL) directly
    /// against committed state, outside any transaction (§6 `Db.exec`).
    /// `BEGIN`/`COMMIT`/`ROLLBACK` are rejected — use [`Db::begin`] instead
    /// (§4.4.1).
    pub fn exec(&self, sql: &str, args: &[Value]) -> EngineResult<ExecResult> {
        let closed = self.closed.read();
        Engine::require_open(*closed)?;
        let stmt = Engine::parse_single(sql)?;
        self.engine.exec_statement(&stmt, args, None)
    }

    /// Runs a SELECT and returns its materialized result set (§6 `Db.query`).
    pub fn query(&self, sql: &str, args: &[Value]) -> EngineResult<Rows> {
        let closed = self.closed.read();
        Engine::require_open(*closed)?;
        let stmt = Engine::parse_single(sql)?;
        let result = self.engine.query_statement(&stmt, args, None)?;
        Ok(Rows::new(result))
    }

    /// Runs a SELECT and returns just its first row (§6 `Db.queryRow`),
    /// failing with [`error::ExecutionError::NoRows`] if the result is empty.
    pub fn query_row(&self, sql: &str, args: &[Value]) -> EngineResult<Vec<Value>> {
        let mut rows = self.query(sql, args)?;
        if !rows.next() {
            return Err(EngineError::Execution(error::ExecutionError::NoRows));
        }
        Ok(rows.row().to_vec())
    }

    /// Begins a transaction (§4.5, §6 `Db.begin`).
    pub fn begin(&self, options: TxOptions) -> EngineResult<Tx> {
        let closed = self.closed.read();
        Engine::require_open(*closed)?;
        Ok(Tx::new(Arc::clone(&self.engine), self.engine.begin(options)))
    }

    /// Flushes the catalog and WAL and closes the backend; idempotent
    /// (§6 `Db.close`). Takes the closed flag's lock exclusively, so it
    /// waits out any `Exec`/`Query` in flight (§5 "Locks" (ii)).
    pub fn close(&self) -> EngineResult<()> {
        let mut closed = self.closed.write();
        if *closed {
            return Ok(());
        }
        self.engine.close()?;
        *closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_after_close_is_database_closed() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.close().unwrap();
        let err = db.exec("CREATE TABLE t (id INTEGER)", &[]).unwrap_err();
        assert!(matches!(err, EngineError::Lifecycle(LifecycleError::DatabaseClosed)));
    }

    #[test]
    fn close_is_idempotent() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.close().unwrap();
        db.close().unwrap();
    }

    #[test]
    fn crud_round_trip() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", &[]).unwrap();
        db.exec(
            "INSERT INTO users (name, age) VALUES ('Ersin', 30), ('Jane', 25), ('John', 35)",
            &[],
        )
        .unwrap();
        db.exec("UPDATE users SET age = 31 WHERE name = 'Ersin'", &[]).unwrap();
        db.exec("DELETE FROM users WHERE age > 30", &[]).unwrap();

        let mut rows = db.query("SELECT name, age FROM users", &[]).unwrap();
        let mut seen = Vec::new();
        while rows.next() {
            seen.push(rows.row().to_vec());
        }
        assert_eq!(seen, vec![vec![Value::Text("Jane".into()), Value::Int(25)]]);
    }

    #[test]
    fn query_row_on_empty_result_errs() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.exec("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        let err = db.query_row("SELECT id FROM t", &[]).unwrap_err();
        assert!(matches!(err, EngineError::Execution(error::ExecutionError::NoRows)));
    }

    #[test]
    fn transaction_commit_is_visible_after_commit() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).unwrap();

        let mut tx = db.begin(TxOptions::default()).unwrap();
        tx.exec("INSERT INTO t (id, v) VALUES (1, 'a')", &[]).unwrap();
        // Read-your-own-writes inside the transaction, before commit.
        let mut rows = tx.query("SELECT v FROM t WHERE id = 1", &[]).unwrap();
        assert!(rows.next());
        assert_eq!(rows.row(), &[Value::Text("a".into())]);
        tx.commit().unwrap();

        let row = db.query_row("SELECT v FROM t WHERE id = 1", &[]).unwrap();
        assert_eq!(row, vec![Value::Text("a".into())]);
    }

    #[test]
    fn transaction_rollback_discards_writes() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).unwrap();

        let mut tx = db.begin(TxOptions::default()).unwrap();
        tx.exec("INSERT INTO t (id, v) VALUES (1, 'a')", &[]).unwrap();
        tx.rollback().unwrap();

        let mut rows = db.query("SELECT v FROM t", &[]).unwrap();
        assert!(!rows.next());
    }

    #[test]
    fn unique_violation_stops_at_second_insert() {
        let db = Db::open(":memory:", DbOptions::default()).unwrap();
        db.exec("CREATE TABLE t (id INTEGER, email TEXT UNIQUE)", &[]).unwrap();
        db.exec("INSERT INTO t (id, email) VALUES (1, 'a@b')", &[]).unwrap();
        assert!(db.exec("INSERT INTO t (id, email) VALUES (2, 'a@b')", &[]).is_err());

        let row = db.query_row("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(row, vec![Value::Int(1)]);
    }
}
