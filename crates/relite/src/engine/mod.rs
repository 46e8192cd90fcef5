//! Catalog + Executor (§4.4): the stateful centerpiece that owns table and
//! index ordered maps alongside the catalog's definitions, and dispatches
//! parsed statements against them. Grounded on the reference engine's
//! `Locking` datastore (one `RwLock` per live structure, no global lock on
//! the whole database) rather than its MVCC page store — this engine's
//! concurrency contract is the simpler one described in §5.

mod ddl;
mod dml;
mod expr;
mod functions;
mod select;
mod trigger;

pub use expr::ColumnRef;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use relite_ordmap::OrderedMap;
use relite_primitives::{IndexId, TableId};
use relite_sats::Value;
use relite_schema::Catalog;
use relite_sql_ast::Statement;
use relite_sql_parser::parse_statement;
use relite_txn::{Transaction, TransactionManager, TxOptions};
use relite_wal::{SyncMode, Wal};

use crate::backend::{Backend, FileBackend, MemoryBackend, MetaPage};
use crate::error::{EngineError, EngineResult, ExecutionError, LifecycleError};
use crate::options::DbOptions;
use crate::persistence;
use crate::row::RowKeyCounter;

/// Outcome of a mutating statement (§6 `Db.exec`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

/// A materialized SELECT result: column names plus row values, in
/// projection order (§6 `Rows`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Where a table/index's live data lives, and the durability path behind
/// it. Built once at [`Engine::open`] and torn down at [`Engine::close`].
pub(crate) struct Storage {
    pub tables: RwLock<HashMap<TableId, OrderedMap>>,
    pub indexes: RwLock<HashMap<IndexId, OrderedMap>>,
}

impl Storage {
    fn new() -> Storage {
        Storage { tables: RwLock::new(HashMap::new()), indexes: RwLock::new(HashMap::new()) }
    }

    pub fn table_map(&self, id: TableId) -> OrderedMap {
        self.tables.read().get(&id).cloned().expect("table storage allocated at creation")
    }

    pub fn index_map(&self, id: IndexId) -> OrderedMap {
        self.indexes.read().get(&id).cloned().expect("index storage allocated at creation")
    }
}

/// The engine: catalog, per-table/per-index ordered maps, the row-key
/// counter, the transaction manager, and (for on-disk databases) the WAL
/// and backend. One instance is shared (via `Arc`) between the [`crate::Db`]
/// façade and every [`crate::Tx`] it hands out.
pub struct Engine {
    pub(crate) catalog: RwLock<Catalog>,
    pub(crate) storage: Storage,
    pub(crate) counter: RowKeyCounter,
    pub(crate) txn_mgr: TransactionManager,
    pub(crate) wal: Option<parking_lot::Mutex<Wal>>,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) options: DbOptions,
    pub(crate) data_dir: Option<PathBuf>,
}

impl Engine {
    #[tracing::instrument(skip(options))]
    pub fn open(path: &str, options: DbOptions) -> EngineResult<Engine> {
        let in_memory = options.in_memory || path == ":memory:";

        let backend: Box<dyn Backend> =
            if in_memory { Box::new(MemoryBackend::new()) } else { Box::new(FileBackend::open(path)?) };
        MetaPage::open_or_init(backend.as_ref(), options.page_size)?;

        let catalog = RwLock::new(Catalog::new());
        let storage = Storage::new();
        let counter = RowKeyCounter::new(0);

        let data_dir = if in_memory { None } else { Some(Path::new(path).with_extension("data")) };
        if let Some(dir) = &data_dir {
            persistence::load(dir, &catalog, &storage, &counter, options.branching_factor)?;
        }

        let wal = if options.wal_enabled && !in_memory {
            let wal_path = Path::new(path).with_extension("wal");
            let (wal, recovery) = Wal::open(&wal_path, options.sync_mode)?;
            persistence::replay(&recovery.records, &catalog, &storage, &counter)?;
            Some(parking_lot::Mutex::new(wal))
        } else {
            None
        };

        log::info!("opened database at {path:?} (in_memory={in_memory})");

        Ok(Engine { catalog, storage, counter, txn_mgr: TransactionManager::new(), wal, backend, options, data_dir })
    }

    /// Flushes the catalog and every table to `P.data/`, checkpoints the
    /// WAL, and syncs the backend (§4.9, §6 "Db.close").
    #[tracing::instrument(skip(self))]
    pub fn checkpoint(&self) -> EngineResult<()> {
        if let Some(dir) = &self.data_dir {
            persistence::save(dir, &self.catalog, &self.storage)?;
        }
        if let Some(wal) = &self.wal {
            wal.lock().checkpoint()?;
        }
        self.backend.sync()?;
        Ok(())
    }

    pub fn close(&self) -> EngineResult<()> {
        self.checkpoint()?;
        self.backend.close()?;
        Ok(())
    }

    pub fn begin(&self, options: TxOptions) -> Transaction {
        self.txn_mgr.begin(options)
    }

    #[tracing::instrument(skip(self, tx))]
    pub fn commit(&self, tx: &mut Transaction) -> EngineResult<()> {
        let writes = self.txn_mgr.commit(tx)?;
        if let Some(wal) = &self.wal {
            let mut wal = wal.lock();
            for (key, write) in &writes {
                let data = crate::persistence::encode_wal_mutation(key.table, &key.row_key, write);
                let kind = match write {
                    relite_txn::Write::Put(_) => relite_wal::WalType::Update,
                    relite_txn::Write::Delete => relite_wal::WalType::Delete,
                };
                wal.append(tx.id, kind, data)?;
            }
            wal.append(tx.id, relite_wal::WalType::Commit, Vec::new())?;
        }
        for (key, write) in writes {
            let map = self.storage.table_map(key.table);
            match write {
                relite_txn::Write::Put(bytes) => {
                    map.put(&key.row_key, &bytes)?;
                    self.update_indexes_for_row(key.table, &key.row_key, Some(&bytes))?;
                }
                relite_txn::Write::Delete => {
                    let _ = map.delete(&key.row_key);
                    self.update_indexes_for_row(key.table, &key.row_key, None)?;
                }
            }
        }
        Ok(())
    }

    pub fn rollback(&self, tx: &mut Transaction) -> EngineResult<()> {
        self.txn_mgr.rollback(tx)?;
        Ok(())
    }

    /// Runs every secondary index on `table` up to date for a row that was
    /// just written (`new_row = Some(encoded)`) or deleted (`None`).
    pub(crate) fn update_indexes_for_row(
        &self,
        table: TableId,
        row_key: &[u8],
        new_row: Option<&[u8]>,
    ) -> EngineResult<()> {
        let catalog = self.catalog.read();
        let indexes: Vec<_> = catalog.indexes_on(table).cloned().collect();
        drop(catalog);
        for index in indexes {
            let index_map = self.storage.index_map(index.id);
            // A single-column index keyed by the textual form of that column.
            if let Some(col) = index.columns.first() {
                // Remove any stale entry pointing at this row key first -
                // cheap because entries are small and indexes aren't huge
                // in this engine's target scale.
                let stale: Vec<Vec<u8>> = index_map
                    .scan_all()
                    .filter(|(_, v)| v.as_slice() == row_key)
                    .map(|(k, _)| k)
                    .collect();
                for k in stale {
                    let _ = index_map.delete(&k);
                }
                if let Some(bytes) = new_row {
                    let row = relite_sats::decode_row(bytes)?;
                    if let Some(value) = row.get(col.0 as usize) {
                        if !value.is_null() {
                            let index_key = value.coerce_text().into_bytes();
                            index_map.put(&index_key, row_key)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// A table's rows in ascending key order, with a transaction's buffered
    /// writes overlaid on top of the committed state (§4.5's
    /// read-your-own-writes, Open Question 4's resolution).
    pub(crate) fn scan_table(&self, table: TableId, tx: Option<&Transaction>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let map = self.storage.table_map(table);
        let mut rows: std::collections::BTreeMap<Vec<u8>, Option<Vec<u8>>> =
            map.scan_all().map(|(k, v)| (k, Some(v))).collect();
        if let Some(tx) = tx {
            for (key, write) in tx.writes_for_table(table) {
                let value = match write {
                    relite_txn::Write::Put(bytes) => Some(bytes.clone()),
                    relite_txn::Write::Delete => None,
                };
                rows.insert(key.row_key.clone(), value);
            }
        }
        rows.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect()
    }

    pub(crate) fn get_row(&self, table: TableId, key: &[u8], tx: Option<&Transaction>) -> EngineResult<Option<Vec<u8>>> {
        if let Some(tx) = tx {
            let txkey = relite_txn::Key::new(table, key.to_vec());
            if let Some(write) = tx.pending_write(&txkey) {
                return Ok(match write {
                    relite_txn::Write::Put(bytes) => Some(bytes.clone()),
                    relite_txn::Write::Delete => None,
                });
            }
        }
        Ok(self.storage.table_map(table).get(key)?)
    }

    /// Buffers a write for `tx` and records the read version for the key
    /// being overwritten (so a concurrent writer of the same key is
    /// detected as a conflict at commit).
    pub(crate) fn write_in_tx(&self, tx: &mut Transaction, table: TableId, key: Vec<u8>, value: Option<Vec<u8>>) {
        let txkey = relite_txn::Key::new(table, key);
        self.txn_mgr.record_read(tx, txkey.clone());
        match value {
            Some(bytes) => self.txn_mgr.record_put(tx, txkey, bytes),
            None => self.txn_mgr.record_delete(tx, txkey),
        }
    }

    /// Applies a write immediately to the live storage and journals it
    /// (direct, non-transactional statement execution). Uses a sentinel
    /// autocommit id (`TxId(0)`) for the WAL record and commits it right
    /// away, since a single ordered-map mutation is already atomic under
    /// the map's own lock and needs no conflict detection of its own.
    pub(crate) fn write_direct(&self, table: TableId, key: &[u8], value: Option<&[u8]>) -> EngineResult<()> {
        if let Some(wal) = &self.wal {
            let data = match value {
                Some(bytes) => crate::persistence::encode_wal_insert(table, key, bytes),
                None => crate::persistence::encode_wal_delete(table, key),
            };
            let kind = if value.is_some() { relite_wal::WalType::Insert } else { relite_wal::WalType::Delete };
            let mut wal = wal.lock();
            wal.append(relite_primitives::TxId(0), kind, data)?;
            wal.append(relite_primitives::TxId(0), relite_wal::WalType::Commit, Vec::new())?;
        }
        let map = self.storage.table_map(table);
        match value {
            Some(bytes) => map.put(key, bytes)?,
            None => {
                let _ = map.delete(key);
            }
        }
        self.update_indexes_for_row(table, key, value)?;
        Ok(())
    }

    /// Parses `sql`, rejecting a script of more than one statement and
    /// transaction-control statements reached through `Exec`/`Query`
    /// rather than the dedicated `begin`/`commit`/`rollback` API (§4.4.1).
    pub(crate) fn parse_single(sql: &str) -> EngineResult<Statement> {
        let stmt = parse_statement(sql)?;
        if matches!(stmt, Statement::Begin | Statement::Commit | Statement::Rollback) {
            return Err(EngineError::Execution(ExecutionError::TransactionViaExec));
        }
        Ok(stmt)
    }

    pub(crate) fn require_open(closed: bool) -> EngineResult<()> {
        if closed {
            return Err(EngineError::Lifecycle(LifecycleError::DatabaseClosed));
        }
        Ok(())
    }

    /// Dispatches one already-parsed mutating statement (§4.4.1). Shared by
    /// the façade's direct `Exec`/`Tx::exec` entry points and by trigger
    /// bodies, which execute as nested statements against the same
    /// catalog (§9 Open Question 5).
    pub(crate) fn exec_statement(
        &self,
        stmt: &Statement,
        args: &[Value],
        tx: Option<&mut Transaction>,
    ) -> EngineResult<ExecResult> {
        match stmt {
            Statement::Insert(insert) => self.execute_insert(insert, args, tx),
            Statement::Update(update) => self.execute_update(update, args, tx),
            Statement::Delete(delete) => self.execute_delete(delete, args, tx),
            Statement::CreateTable(create) => self.ddl_create_table(create),
            Statement::CreateIndex(create) => self.ddl_create_index(create, tx.map(|t| &*t)),
            Statement::CreateCollection(create) => self.ddl_create_collection(create),
            Statement::CreateView(create) => self.ddl_create_view(create),
            Statement::CreateTrigger(create) => self.ddl_create_trigger(create),
            Statement::CreateProcedure(create) => self.ddl_create_procedure(create),
            Statement::DropTable(drop) => self.ddl_drop_table(drop),
            Statement::DropIndex(drop) => self.ddl_drop_index(drop),
            Statement::DropView(drop) => self.ddl_drop_view(drop),
            Statement::DropTrigger(drop) => self.ddl_drop_trigger(drop),
            Statement::DropProcedure(drop) => self.ddl_drop_procedure(drop),
            Statement::Call { name, args: call_args } => self.exec_procedure(name, call_args, args, tx),
            Statement::Select(_) => {
                Err(EngineError::Execution(ExecutionError::TypeMismatch("SELECT must be issued through Query".into())))
            }
            Statement::Begin | Statement::Commit | Statement::Rollback => {
                Err(EngineError::Execution(ExecutionError::TransactionViaExec))
            }
        }
    }

    pub(crate) fn query_statement(
        &self,
        stmt: &Statement,
        args: &[Value],
        tx: Option<&Transaction>,
    ) -> EngineResult<QueryResult> {
        match stmt {
            Statement::Select(select) => self.execute_select(select, args, tx),
            other => Err(EngineError::Execution(ExecutionError::TypeMismatch(format!(
                "{other:?} cannot be issued through Query"
            )))),
        }
    }
}
