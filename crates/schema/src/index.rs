use relite_primitives::{ColId, IndexId, TableId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSchema {
    pub id: IndexId,
    pub name: String,
    pub table: TableId,
    pub columns: Vec<ColId>,
    pub unique: bool,
}
