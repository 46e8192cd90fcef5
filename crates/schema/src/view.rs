use relite_primitives::ViewId;
use relite_sql_ast::Select;

#[derive(Clone, Debug)]
pub struct ViewSchema {
    pub id: ViewId,
    pub name: String,
    pub query: Select,
}
