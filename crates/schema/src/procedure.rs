use relite_primitives::ProcedureId;
use relite_sql_ast::Statement;

#[derive(Clone, Debug)]
pub struct ProcedureSchema {
    pub id: ProcedureId,
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}
