use relite_primitives::ColId;
use relite_sql_ast::Expr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Json,
    Date,
    Timestamp,
}

impl From<relite_sql_ast::ColumnType> for ColumnType {
    fn from(ty: relite_sql_ast::ColumnType) -> ColumnType {
        use relite_sql_ast::ColumnType as Ast;
        match ty {
            Ast::Integer => ColumnType::Integer,
            Ast::Real => ColumnType::Real,
            Ast::Text => ColumnType::Text,
            Ast::Blob => ColumnType::Blob,
            Ast::Boolean => ColumnType::Boolean,
            Ast::Json => ColumnType::Json,
            Ast::Date => ColumnType::Date,
            Ast::Timestamp => ColumnType::Timestamp,
        }
    }
}

/// A column's schema-level definition: its position (`id`), type, and
/// declared constraints. Constraint *enforcement* is the executor's job;
/// this is just the catalog's record of what was declared.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub id: ColId,
    pub name: String,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub not_null: bool,
    pub default: Option<Expr>,
    pub check: Option<Expr>,
}
