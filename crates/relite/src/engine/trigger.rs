//! `AFTER` trigger firing (§4.4.5, §9 Open Question 5): once a firing
//! statement's own row mutations are applied, its matching triggers run as
//! nested statements against the same catalog, inside the same
//! transaction (or the same autocommit scope for a direct statement). A
//! trigger error aborts the firing statement.

use relite_sats::Value;
use relite_sql_ast::{TriggerEvent, TriggerTiming};
use relite_txn::Transaction;

use crate::error::EngineResult;

use super::Engine;

impl Engine {
    #[tracing::instrument(skip(self, table, args, tx))]
    pub(crate) fn fire_triggers(
        &self,
        table: &relite_schema::TableSchema,
        timing: TriggerTiming,
        event: TriggerEvent,
        args: &[Value],
        mut tx: Option<&mut Transaction>,
    ) -> EngineResult<()> {
        let catalog = self.catalog.read();
        let triggers: Vec<_> = catalog.triggers_for(table.id, timing, event).into_iter().cloned().collect();
        drop(catalog);

        for trigger in &triggers {
            log::debug!("firing trigger {:?} on table {:?}", trigger.name, table.name);
            for stmt in &trigger.body {
                self.exec_statement(stmt, args, tx.as_deref_mut())?;
            }
        }
        Ok(())
    }
}
