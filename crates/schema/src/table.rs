use indexmap::IndexMap;
use relite_primitives::{ColId, IndexId, TableId};
use relite_sql_ast::ForeignKeyDef;

use crate::column::ColumnSchema;
use crate::error::SchemaError;

/// A table's catalog entry: its declared columns (order-preserving, as
/// declared), a name→position cache, its foreign keys, and the ids of the
/// secondary indexes defined on it.
#[derive(Clone, Debug)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    column_index: IndexMap<String, ColId>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub indexes: Vec<IndexId>,
}

impl TableSchema {
    pub fn new(id: TableId, name: String, columns: Vec<ColumnSchema>, foreign_keys: Vec<ForeignKeyDef>) -> TableSchema {
        let column_index = columns.iter().map(|c| (c.name.clone(), c.id)).collect();
        TableSchema { id, name, columns, column_index, foreign_keys, indexes: Vec::new() }
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnSchema> {
        let id = self.column_index.get(name)?;
        self.columns.get(id.0 as usize)
    }

    pub fn column_index_by_name(&self, name: &str) -> Result<ColId, SchemaError> {
        self.column_index.get(name).copied().ok_or_else(|| SchemaError::ColumnNotFound(name.to_owned()))
    }

    pub fn primary_key_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.unique || c.primary_key)
    }
}
