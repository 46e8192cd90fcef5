//! CREATE/DROP for tables, indexes, views, triggers, and procedures
//! (§4.4.1), plus `CALL` dispatch. Each statement allocates or tears down
//! the catalog entry first, then the backing ordered map(s) that entry
//! owns — mirroring how the reference engine's `MutTxDatastore` pairs
//! schema changes with the underlying table/index storage it governs.

use relite_ordmap::OrderedMap;
use relite_sats::Value;
use relite_sql_ast::{
    ColumnDef, ColumnType, CreateCollection, CreateIndex, CreateProcedure, CreateTable,
    CreateTrigger, CreateView, DropIndex, DropProcedure, DropTable, DropTrigger, DropView, Expr,
};
use relite_txn::Transaction;

use crate::error::{EngineError, EngineResult, ExecutionError};

use super::expr::{eval, EvalCtx, NoSubqueries};
use super::{Engine, ExecResult};

impl Engine {
    #[tracing::instrument(skip(self, create))]
    pub(crate) fn ddl_create_table(&self, create: &CreateTable) -> EngineResult<ExecResult> {
        if create.if_not_exists && self.catalog.read().table(&create.name).is_some() {
            return Ok(ExecResult::default());
        }
        let mut catalog = self.catalog.write();
        let table_id = catalog.create_table(&create.name, create.columns.clone(), create.foreign_keys.clone())?;
        drop(catalog);
        self.storage
            .tables
            .write()
            .insert(table_id, OrderedMap::with_branching_factor(self.options.branching_factor));
        log::debug!("allocated storage for table {:?}", create.name);
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_drop_table(&self, drop: &DropTable) -> EngineResult<ExecResult> {
        let mut catalog = self.catalog.write();
        if drop.if_exists && catalog.table(&drop.name).is_none() {
            return Ok(ExecResult::default());
        }
        let table_id = catalog.table(&drop.name).ok_or_else(|| {
            relite_schema::SchemaError::TableNotFound(drop.name.clone())
        })?.id;
        let orphaned_indexes: Vec<_> = catalog.indexes_on(table_id).map(|idx| idx.id).collect();
        catalog.drop_table(&drop.name)?;
        drop(catalog);
        self.storage.tables.write().remove(&table_id);
        let mut indexes = self.storage.indexes.write();
        for index_id in orphaned_indexes {
            indexes.remove(&index_id);
        }
        Ok(ExecResult::default())
    }

    /// Populates the new index by scanning the table's current rows — the
    /// reference engine does the same when a `CREATE INDEX` runs against a
    /// non-empty table rather than requiring it to start empty.
    #[tracing::instrument(skip(self, create, _tx))]
    pub(crate) fn ddl_create_index(&self, create: &CreateIndex, _tx: Option<&Transaction>) -> EngineResult<ExecResult> {
        if create.if_not_exists && self.catalog.read().index(&create.name).is_some() {
            return Ok(ExecResult::default());
        }
        let mut catalog = self.catalog.write();
        let index_id = catalog.create_index(&create.name, &create.table, create.columns.clone(), create.unique)?;
        let table = catalog.require_table(&create.table)?.clone();
        drop(catalog);

        let index_map = OrderedMap::with_branching_factor(self.options.branching_factor);
        if let Some(col_name) = create.columns.first() {
            let col = table.column_index_by_name(col_name)?;
            for (row_key, bytes) in self.storage.table_map(table.id).scan_all() {
                let row = relite_sats::decode_row(&bytes)?;
                if let Some(value) = row.get(col.0 as usize) {
                    if !value.is_null() {
                        index_map.put(&value.coerce_text().into_bytes(), &row_key)?;
                    }
                }
            }
        }
        self.storage.indexes.write().insert(index_id, index_map);
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_drop_index(&self, drop: &DropIndex) -> EngineResult<ExecResult> {
        let mut catalog = self.catalog.write();
        if drop.if_exists && catalog.index(&drop.name).is_none() {
            return Ok(ExecResult::default());
        }
        let index_id = catalog.drop_index(&drop.name)?;
        drop(catalog);
        self.storage.indexes.write().remove(&index_id);
        Ok(ExecResult::default())
    }

    /// `CREATE COLLECTION name` (§9 Open Question, collection resolution):
    /// sugar for a two-column document table `(id INTEGER PRIMARY KEY,
    /// doc JSON NOT NULL)`, letting schemaless inserts key off the
    /// row-key policy's auto-increment fallback (§4.4.2) while keeping a
    /// single JSON payload column addressable through the `JsonPath`
    /// built-ins (§4.4.9).
    pub(crate) fn ddl_create_collection(&self, create: &CreateCollection) -> EngineResult<ExecResult> {
        if create.if_not_exists && self.catalog.read().table(&create.name).is_some() {
            return Ok(ExecResult::default());
        }
        let columns = vec![
            ColumnDef {
                name: "id".into(),
                ty: ColumnType::Integer,
                primary_key: true,
                auto_increment: true,
                unique: false,
                not_null: true,
                default: None,
                check: None,
            },
            ColumnDef {
                name: "doc".into(),
                ty: ColumnType::Json,
                primary_key: false,
                auto_increment: false,
                unique: false,
                not_null: true,
                default: None,
                check: None,
            },
        ];
        let mut catalog = self.catalog.write();
        let table_id = catalog.create_table(&create.name, columns, Vec::new())?;
        drop(catalog);
        self.storage
            .tables
            .write()
            .insert(table_id, OrderedMap::with_branching_factor(self.options.branching_factor));
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_create_view(&self, create: &CreateView) -> EngineResult<ExecResult> {
        if create.if_not_exists && self.catalog.read().view(&create.name).is_some() {
            return Ok(ExecResult::default());
        }
        self.catalog.write().create_view(&create.name, create.query.clone())?;
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_drop_view(&self, drop: &DropView) -> EngineResult<ExecResult> {
        let mut catalog = self.catalog.write();
        if drop.if_exists && catalog.view(&drop.name).is_none() {
            return Ok(ExecResult::default());
        }
        catalog.drop_view(&drop.name)?;
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_create_trigger(&self, create: &CreateTrigger) -> EngineResult<ExecResult> {
        self.catalog.write().create_trigger(&create.name, &create.table, create.timing, create.event, create.body.clone())?;
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_drop_trigger(&self, drop: &DropTrigger) -> EngineResult<ExecResult> {
        match self.catalog.write().drop_trigger(&drop.name) {
            Ok(_) => Ok(ExecResult::default()),
            Err(_) if drop.if_exists => Ok(ExecResult::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn ddl_create_procedure(&self, create: &CreateProcedure) -> EngineResult<ExecResult> {
        self.catalog.write().create_procedure(&create.name, create.params.clone(), create.body.clone())?;
        Ok(ExecResult::default())
    }

    pub(crate) fn ddl_drop_procedure(&self, drop: &DropProcedure) -> EngineResult<ExecResult> {
        let mut catalog = self.catalog.write();
        if drop.if_exists && catalog.procedure(&drop.name).is_none() {
            return Ok(ExecResult::default());
        }
        catalog.drop_procedure(&drop.name)?;
        Ok(ExecResult::default())
    }

    /// `CALL name(args...)`: binds the call-site argument expressions
    /// (evaluated against the caller's own placeholder vector, with no row
    /// context) into a fresh placeholder vector, then runs the procedure's
    /// body as nested statements in declaration order — named, parameterized
    /// statement batches rather than event hooks (§9 Open Question 5).
    #[tracing::instrument(skip(self, call_args, args, tx))]
    pub(crate) fn exec_procedure(
        &self,
        name: &str,
        call_args: &[Expr],
        args: &[Value],
        mut tx: Option<&mut Transaction>,
    ) -> EngineResult<ExecResult> {
        let catalog = self.catalog.read();
        let proc = catalog.procedure(name).cloned().ok_or_else(|| {
            EngineError::Schema(relite_schema::SchemaError::ProcedureNotFound(name.to_owned()))
        })?;
        drop(catalog);

        if call_args.len() != proc.params.len() {
            return Err(EngineError::Execution(ExecutionError::TypeMismatch(format!(
                "procedure {name:?} expects {} argument(s), got {}",
                proc.params.len(),
                call_args.len()
            ))));
        }
        let no_subqueries = NoSubqueries;
        let bound: Vec<Value> = call_args
            .iter()
            .map(|expr| {
                let ctx = EvalCtx { columns: &[], row: &[], args, subqueries: &no_subqueries };
                eval(expr, &ctx)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let mut rows_affected = 0u64;
        let mut last_insert_id = 0i64;
        for stmt in &proc.body {
            let result = self.exec_statement(stmt, &bound, tx.as_deref_mut())?;
            rows_affected += result.rows_affected;
            last_insert_id = result.last_insert_id;
        }
        Ok(ExecResult { last_insert_id, rows_affected })
    }
}

#[cfg(test)]
mod tests {
    use relite_sql_ast::{ColumnType as AstColumnType, ForeignKeyDef};

    use super::*;
    use crate::options::DbOptions;

    fn table(name: &str) -> CreateTable {
        CreateTable {
            name: name.to_owned(),
            if_not_exists: false,
            columns: vec![ColumnDef {
                name: "id".into(),
                ty: AstColumnType::Integer,
                primary_key: true,
                auto_increment: true,
                unique: false,
                not_null: true,
                default: None,
                check: None,
            }],
            foreign_keys: Vec::<ForeignKeyDef>::new(),
        }
    }

    #[test]
    fn create_collection_adds_id_and_doc_columns() {
        let engine = Engine::open(":memory:", DbOptions::new().in_memory(true)).unwrap();
        engine.ddl_create_collection(&CreateCollection { name: "docs".into(), if_not_exists: false }).unwrap();
        let catalog = engine.catalog.read();
        let schema = catalog.table("docs").unwrap();
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(schema.columns[0].name, "id");
        assert_eq!(schema.columns[1].name, "doc");
    }

    #[test]
    fn create_table_if_not_exists_is_idempotent() {
        let engine = Engine::open(":memory:", DbOptions::new().in_memory(true)).unwrap();
        let mut create = table("t");
        engine.ddl_create_table(&create).unwrap();
        create.if_not_exists = true;
        engine.ddl_create_table(&create).unwrap();
    }

    #[test]
    fn drop_table_without_if_exists_errors_when_missing() {
        let engine = Engine::open(":memory:", DbOptions::new().in_memory(true)).unwrap();
        let result = engine.ddl_drop_table(&DropTable { name: "missing".into(), if_exists: false });
        assert!(result.is_err());
    }
}
