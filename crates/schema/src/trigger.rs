use relite_primitives::{TableId, TriggerId};
use relite_sql_ast::{Statement, TriggerEvent, TriggerTiming};

#[derive(Clone, Debug)]
pub struct TriggerSchema {
    pub id: TriggerId,
    pub name: String,
    pub table: TableId,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    pub body: Vec<Statement>,
}
