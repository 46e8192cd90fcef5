//! INSERT/UPDATE/DELETE (§4.4.3–§4.4.5): constraint enforcement, row-key
//! derivation, secondary-index maintenance, and `AFTER` trigger firing.

use relite_primitives::ColId;
use relite_sats::Value;
use relite_sql_ast::{Delete, Insert, TriggerEvent, Update};
use relite_schema::{ColumnSchema, TableSchema};
use relite_txn::Transaction;

use crate::error::{ConstraintError, EngineError, EngineResult};
use crate::row::{derive_row_key, scatter_insert_row};

use super::expr::{eval, ColumnRef, EvalCtx, NoSubqueries};
use super::{Engine, ExecResult};

impl Engine {
    #[tracing::instrument(skip(self, insert, args, tx))]
    pub(crate) fn execute_insert(
        &self,
        insert: &Insert,
        args: &[Value],
        mut tx: Option<&mut Transaction>,
    ) -> EngineResult<ExecResult> {
        let catalog = self.catalog.read();
        let table = catalog.require_table(&insert.table)?.clone();
        drop(catalog);

        let insert_columns: Vec<ColId> = if insert.columns.is_empty() {
            table.columns.iter().map(|c| c.id).collect()
        } else {
            insert.columns.iter().map(|name| table.column_index_by_name(name)).collect::<Result<_, _>>()?
        };

        let no_subqueries = NoSubqueries;
        let mut rows_affected = 0u64;
        for value_row in &insert.values {
            let values = value_row
                .iter()
                .map(|expr| {
                    let ctx = EvalCtx { columns: &[], row: &[], args, subqueries: &no_subqueries };
                    eval(expr, &ctx)
                })
                .collect::<EngineResult<Vec<_>>>()?;

            let row = scatter_insert_row(&table, &insert_columns, values, |col| default_for(col, args, &no_subqueries));
            let key = derive_row_key(&table, &row, &self.counter);

            self.enforce_unique(&table, &row, None, tx.as_deref())?;
            self.enforce_check(&table, &row, &no_subqueries, args)?;
            self.enforce_foreign_keys(&table, &row)?;

            let encoded = relite_sats::encode_row(&row);
            match tx.as_deref_mut() {
                Some(tx) => self.write_in_tx(tx, table.id, key.clone(), Some(encoded)),
                None => self.write_direct(table.id, &key, Some(&encoded))?,
            }
            rows_affected += 1;
        }

        self.fire_triggers(&table, relite_sql_ast::TriggerTiming::After, TriggerEvent::Insert, args, tx.as_deref_mut())?;
        Ok(ExecResult { last_insert_id: 0, rows_affected })
    }

    #[tracing::instrument(skip(self, update, args, tx))]
    pub(crate) fn execute_update(
        &self,
        update: &Update,
        args: &[Value],
        mut tx: Option<&mut Transaction>,
    ) -> EngineResult<ExecResult> {
        let catalog = self.catalog.read();
        let table = catalog.require_table(&update.table)?.clone();
        drop(catalog);

        let columns: Vec<ColumnRef> = table.columns.iter().map(|c| ColumnRef::new(None, c.name.clone())).collect();
        let no_subqueries = NoSubqueries;
        let existing = self.scan_table(table.id, tx.as_deref().map(|t| &*t));

        let mut pending: Vec<(Vec<u8>, Vec<Value>)> = Vec::new();
        for (key, bytes) in &existing {
            let row = relite_sats::decode_row(bytes)?;
            let ctx = EvalCtx { columns: &columns, row: &row, args, subqueries: &no_subqueries };
            if let Some(filter) = &update.filter {
                if !eval(filter, &ctx)?.is_truthy() {
                    continue;
                }
            }
            let mut candidate = row.clone();
            for (col_name, value_expr) in &update.assignments {
                let idx = table.column_index_by_name(col_name)?;
                let value_ctx = EvalCtx { columns: &columns, row: &row, args, subqueries: &no_subqueries };
                candidate[idx.0 as usize] = eval(value_expr, &value_ctx)?;
            }
            self.enforce_unique(&table, &candidate, Some(key), tx.as_deref())?;
            self.enforce_check(&table, &candidate, &no_subqueries, args)?;
            pending.push((key.clone(), candidate));
        }

        let rows_affected = pending.len() as u64;
        for (key, candidate) in pending {
            let encoded = relite_sats::encode_row(&candidate);
            match tx.as_deref_mut() {
                Some(tx) => self.write_in_tx(tx, table.id, key, Some(encoded)),
                None => self.write_direct(table.id, &key, Some(&encoded))?,
            }
        }

        self.fire_triggers(&table, relite_sql_ast::TriggerTiming::After, TriggerEvent::Update, args, tx.as_deref_mut())?;
        Ok(ExecResult { last_insert_id: 0, rows_affected })
    }

    #[tracing::instrument(skip(self, delete, args, tx))]
    pub(crate) fn execute_delete(
        &self,
        delete: &Delete,
        args: &[Value],
        mut tx: Option<&mut Transaction>,
    ) -> EngineResult<ExecResult> {
        let catalog = self.catalog.read();
        let table = catalog.require_table(&delete.table)?.clone();
        drop(catalog);

        let columns: Vec<ColumnRef> = table.columns.iter().map(|c| ColumnRef::new(None, c.name.clone())).collect();
        let no_subqueries = NoSubqueries;
        let existing = self.scan_table(table.id, tx.as_deref().map(|t| &*t));

        let mut keys = Vec::new();
        for (key, bytes) in &existing {
            let row = relite_sats::decode_row(bytes)?;
            let ctx = EvalCtx { columns: &columns, row: &row, args, subqueries: &no_subqueries };
            let keep = match &delete.filter {
                Some(filter) => eval(filter, &ctx)?.is_truthy(),
                None => true,
            };
            if keep {
                keys.push(key.clone());
            }
        }

        let rows_affected = keys.len() as u64;
        for key in keys {
            match tx.as_deref_mut() {
                Some(tx) => self.write_in_tx(tx, table.id, key, None),
                None => self.write_direct(table.id, &key, None)?,
            }
        }

        self.fire_triggers(&table, relite_sql_ast::TriggerTiming::After, TriggerEvent::Delete, args, tx.as_deref_mut())?;
        Ok(ExecResult { last_insert_id: 0, rows_affected })
    }

    fn enforce_unique(
        &self,
        table: &TableSchema,
        candidate: &[Value],
        self_key: Option<&[u8]>,
        tx: Option<&Transaction>,
    ) -> EngineResult<()> {
        let rows = self.scan_table(table.id, tx);
        for col in table.unique_columns() {
            let value = &candidate[col.id.0 as usize];
            if value.is_null() {
                continue;
            }
            for (key, bytes) in &rows {
                if Some(key.as_slice()) == self_key {
                    continue;
                }
                let other = relite_sats::decode_row(bytes)?;
                if relite_sats::scalar_cmp(value, &other[col.id.0 as usize]) == Some(std::cmp::Ordering::Equal) {
                    return Err(EngineError::Constraint(ConstraintError::UniqueViolation {
                        table: table.name.clone(),
                        column: col.name.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    fn enforce_check(
        &self,
        table: &TableSchema,
        candidate: &[Value],
        no_subqueries: &NoSubqueries,
        args: &[Value],
    ) -> EngineResult<()> {
        let columns: Vec<ColumnRef> = table.columns.iter().map(|c| ColumnRef::new(None, c.name.clone())).collect();
        for col in &table.columns {
            if let Some(check) = &col.check {
                let ctx = EvalCtx { columns: &columns, row: candidate, args, subqueries: no_subqueries };
                if !eval(check, &ctx)?.is_truthy() {
                    return Err(EngineError::Constraint(ConstraintError::CheckViolation {
                        table: table.name.clone(),
                        column: col.name.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    fn enforce_foreign_keys(&self, table: &TableSchema, candidate: &[Value]) -> EngineResult<()> {
        for fk in &table.foreign_keys {
            let catalog = self.catalog.read();
            let ref_table = catalog.require_table(&fk.ref_table)?.clone();
            drop(catalog);
            for (local_col, ref_col) in fk.columns.iter().zip(&fk.ref_columns) {
                let local_idx = table.column_index_by_name(local_col)?;
                let local_value = &candidate[local_idx.0 as usize];
                if local_value.is_null() {
                    continue;
                }
                let ref_idx = ref_table.column_index_by_name(ref_col)?;
                let found = self.scan_table(ref_table.id, None).into_iter().any(|(_, bytes)| {
                    relite_sats::decode_row(&bytes)
                        .map(|row| relite_sats::scalar_cmp(local_value, &row[ref_idx.0 as usize]) == Some(std::cmp::Ordering::Equal))
                        .unwrap_or(false)
                });
                if !found {
                    return Err(EngineError::Constraint(ConstraintError::ForeignKeyViolation {
                        local_table: table.name.clone(),
                        local_column: local_col.clone(),
                        ref_table: fk.ref_table.clone(),
                        ref_column: ref_col.clone(),
                    }));
                }
            }
        }
        Ok(())
    }
}

fn default_for(col: &ColumnSchema, args: &[Value], no_subqueries: &NoSubqueries) -> Option<Value> {
    let expr = col.default.as_ref()?;
    let ctx = EvalCtx { columns: &[], row: &[], args, subqueries: no_subqueries };
    eval(expr, &ctx).ok()
}
