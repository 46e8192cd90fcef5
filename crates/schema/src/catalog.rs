use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;
use relite_primitives::{ColId, IndexId, ProcedureId, TableId, TriggerId, ViewId};
use relite_sql_ast::{ForeignKeyDef, Select, Statement, TriggerEvent, TriggerTiming};

use crate::column::ColumnSchema;
use crate::error::SchemaError;
use crate::index::IndexSchema;
use crate::procedure::ProcedureSchema;
use crate::table::TableSchema;
use crate::trigger::TriggerSchema;
use crate::view::ViewSchema;

/// The catalog: the set of table/index/view/trigger/procedure definitions
/// and the id counters that name them. Holds no row data itself — that
/// lives in the executor's per-table ordered maps, keyed by the ids
/// handed out here.
#[derive(Default)]
pub struct Catalog {
    tables: IndexMap<String, TableSchema>,
    indexes: IndexMap<String, IndexSchema>,
    views: IndexMap<String, ViewSchema>,
    triggers: IndexMap<String, TriggerSchema>,
    procedures: IndexMap<String, ProcedureSchema>,
    next_table_id: AtomicU32,
    next_index_id: AtomicU32,
    next_view_id: AtomicU32,
    next_trigger_id: AtomicU32,
    next_procedure_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    // ---- tables ----

    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<relite_sql_ast::ColumnDef>,
        foreign_keys: Vec<ForeignKeyDef>,
    ) -> Result<TableId, SchemaError> {
        if self.tables.contains_key(name) {
            return Err(SchemaError::TableExists(name.to_owned()));
        }
        let id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
        let column_schemas = columns
            .into_iter()
            .enumerate()
            .map(|(i, def)| ColumnSchema {
                id: ColId(i as u32),
                name: def.name,
                ty: def.ty.into(),
                primary_key: def.primary_key,
                auto_increment: def.auto_increment,
                unique: def.unique,
                not_null: def.not_null,
                default: def.default,
                check: def.check,
            })
            .collect();
        let table = TableSchema::new(id, name.to_owned(), column_schemas, foreign_keys);
        self.tables.insert(name.to_owned(), table);
        log::debug!("created table {name} as {id}");
        Ok(id)
    }

    pub fn drop_table(&mut self, name: &str) -> Result<TableId, SchemaError> {
        let table = self.tables.shift_remove(name).ok_or_else(|| SchemaError::TableNotFound(name.to_owned()))?;
        self.indexes.retain(|_, idx| idx.table != table.id);
        self.triggers.retain(|_, t| t.table != table.id);
        Ok(table.id)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableSchema> {
        self.tables.get_mut(name)
    }

    pub fn require_table(&self, name: &str) -> Result<&TableSchema, SchemaError> {
        self.table(name).ok_or_else(|| SchemaError::TableNotFound(name.to_owned()))
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&TableSchema> {
        self.tables.values().find(|t| t.id == id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    // ---- indexes ----

    pub fn create_index(
        &mut self,
        name: &str,
        table: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<IndexId, SchemaError> {
        if self.indexes.contains_key(name) {
            return Err(SchemaError::IndexExists(name.to_owned()));
        }
        let table_schema = self.require_table(table)?;
        let col_ids = columns
            .iter()
            .map(|c| table_schema.column_index_by_name(c))
            .collect::<Result<Vec<_>, _>>()?;
        let table_id = table_schema.id;
        let id = IndexId(self.next_index_id.fetch_add(1, Ordering::SeqCst));
        self.indexes.insert(
            name.to_owned(),
            IndexSchema { id, name: name.to_owned(), table: table_id, columns: col_ids, unique },
        );
        self.tables.get_mut(table).expect("table exists").indexes.push(id);
        Ok(id)
    }

    pub fn drop_index(&mut self, name: &str) -> Result<IndexId, SchemaError> {
        let index = self.indexes.shift_remove(name).ok_or_else(|| SchemaError::IndexNotFound(name.to_owned()))?;
        for table in self.tables.values_mut() {
            table.indexes.retain(|&i| i != index.id);
        }
        Ok(index.id)
    }

    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.get(name)
    }

    pub fn indexes_on(&self, table: TableId) -> impl Iterator<Item = &IndexSchema> {
        self.indexes.values().filter(move |i| i.table == table)
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexSchema> {
        self.indexes.values()
    }

    // ---- views ----

    pub fn create_view(&mut self, name: &str, query: Select) -> Result<ViewId, SchemaError> {
        if self.views.contains_key(name) {
            return Err(SchemaError::ViewExists(name.to_owned()));
        }
        let id = ViewId(self.next_view_id.fetch_add(1, Ordering::SeqCst));
        self.views.insert(name.to_owned(), ViewSchema { id, name: name.to_owned(), query });
        Ok(id)
    }

    pub fn drop_view(&mut self, name: &str) -> Result<ViewId, SchemaError> {
        self.views.shift_remove(name).map(|v| v.id).ok_or_else(|| SchemaError::ViewNotFound(name.to_owned()))
    }

    pub fn view(&self, name: &str) -> Option<&ViewSchema> {
        self.views.get(name)
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewSchema> {
        self.views.values()
    }

    // ---- triggers ----

    pub fn create_trigger(
        &mut self,
        name: &str,
        table: &str,
        timing: TriggerTiming,
        event: TriggerEvent,
        body: Vec<Statement>,
    ) -> Result<TriggerId, SchemaError> {
        if self.triggers.contains_key(name) {
            return Err(SchemaError::TriggerExists(name.to_owned()));
        }
        let table_id = self.require_table(table)?.id;
        let id = TriggerId(self.next_trigger_id.fetch_add(1, Ordering::SeqCst));
        self.triggers.insert(name.to_owned(), TriggerSchema { id, name: name.to_owned(), table: table_id, timing, event, body });
        Ok(id)
    }

    pub fn drop_trigger(&mut self, name: &str) -> Result<TriggerId, SchemaError> {
        self.triggers.shift_remove(name).map(|t| t.id).ok_or_else(|| SchemaError::TriggerNotFound(name.to_owned()))
    }

    /// Triggers that fire for `(table, timing, event)`, in declaration order.
    pub fn triggers_for(&self, table: TableId, timing: TriggerTiming, event: TriggerEvent) -> Vec<&TriggerSchema> {
        self.triggers.values().filter(|t| t.table == table && t.timing == timing && t.event == event).collect()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &TriggerSchema> {
        self.triggers.values()
    }

    // ---- procedures ----

    pub fn create_procedure(&mut self, name: &str, params: Vec<String>, body: Vec<Statement>) -> Result<ProcedureId, SchemaError> {
        if self.procedures.contains_key(name) {
            return Err(SchemaError::ProcedureExists(name.to_owned()));
        }
        let id = ProcedureId(self.next_procedure_id.fetch_add(1, Ordering::SeqCst));
        self.procedures.insert(name.to_owned(), ProcedureSchema { id, name: name.to_owned(), params, body });
        Ok(id)
    }

    pub fn drop_procedure(&mut self, name: &str) -> Result<ProcedureId, SchemaError> {
        self.procedures.shift_remove(name).map(|p| p.id).ok_or_else(|| SchemaError::ProcedureNotFound(name.to_owned()))
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcedureSchema> {
        self.procedures.get(name)
    }

    pub fn procedures(&self) -> impl Iterator<Item = &ProcedureSchema> {
        self.procedures.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relite_sql_ast::ColumnDef;

    fn col(name: &str, ty: relite_sql_ast::ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.to_owned(),
            ty,
            primary_key: false,
            auto_increment: false,
            unique: false,
            not_null: false,
            default: None,
            check: None,
        }
    }

    #[test]
    fn create_and_find_table_by_name() {
        let mut catalog = Catalog::new();
        catalog
            .create_table("users", vec![col("id", relite_sql_ast::ColumnType::Integer)], vec![])
            .unwrap();
        let table = catalog.table("users").unwrap();
        assert_eq!(table.column_by_name("id").unwrap().ty, crate::column::ColumnType::Integer);
    }

    #[test]
    fn create_table_twice_fails() {
        let mut catalog = Catalog::new();
        catalog.create_table("t", vec![], vec![]).unwrap();
        assert_eq!(catalog.create_table("t", vec![], vec![]), Err(SchemaError::TableExists("t".into())));
    }

    #[test]
    fn drop_table_removes_its_indexes() {
        let mut catalog = Catalog::new();
        catalog
            .create_table("t", vec![col("a", relite_sql_ast::ColumnType::Integer)], vec![])
            .unwrap();
        catalog.create_index("idx_a", "t", vec!["a".into()], false).unwrap();
        catalog.drop_table("t").unwrap();
        assert!(catalog.index("idx_a").is_none());
    }
}
