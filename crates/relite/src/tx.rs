//! `Tx`: a handle on an in-flight transaction (§4.5, §6).
//!
//! Per the resolution of Open Question 4 (§9), `Tx::exec`/`Tx::query` route
//! through the transaction's own buffered write set rather than delegating
//! straight to the engine's committed state: a transaction reads committed
//! rows overlaid with its own prior writes, and its writes stay invisible
//! to everyone else until [`Tx::commit`].

use std::sync::Arc;

use relite_sats::Value;
use relite_txn::Transaction;

use crate::engine::{Engine, ExecResult};
use crate::error::EngineResult;
use crate::rows::Rows;

/// An open transaction. Consumed by [`Tx::commit`]/[`Tx::rollback`] so the
/// type system, not just the transaction manager's state check, prevents
/// issuing another statement against an already-finished transaction.
pub struct Tx {
    engine: Arc<Engine>,
    txn: Transaction,
}

impl Tx {
    pub(crate) fn new(engine: Arc<Engine>, txn: Transaction) -> Tx {
        Tx { engine, txn }
    }

    /// This transaction's id, also its snapshot start timestamp (§4.5).
    pub fn id(&self) -> u64 {
        self.txn.id.0
    }

    /// Executes a mutating statement, buffering its writes in this
    /// transaction rather than applying them to live storage (§4.5, §9 OQ4).
    pub fn exec(&mut self, sql: &str, args: &[Value]) -> EngineResult<ExecResult> {
        let stmt = Engine::parse_single(sql)?;
        self.engine.exec_statement(&stmt, args, Some(&mut self.txn))
    }

    /// Queries against committed state overlaid with this transaction's own
    /// buffered writes (read-your-own-writes, §9 OQ4).
    pub fn query(&self, sql: &str, args: &[Value]) -> EngineResult<Rows> {
        let stmt = Engine::parse_single(sql)?;
        let result = self.engine.query_statement(&stmt, args, Some(&self.txn))?;
        Ok(Rows::new(result))
    }

    /// Commits (§4.5): conflict-checks the read set against concurrently
    /// committed writes, then applies the write set to live storage and the
    /// WAL. Consumes the handle — a committed transaction has nothing left
    /// to do.
    pub fn commit(mut self) -> EngineResult<()> {
        self.engine.commit(&mut self.txn)
    }

    /// Drops both sets and moves to `Aborted` (§4.5). Consumes the handle.
    pub fn rollback(mut self) -> EngineResult<()> {
        self.engine.rollback(&mut self.txn)
    }
}
