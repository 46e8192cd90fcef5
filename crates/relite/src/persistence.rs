//! Schema and data durability (§4.9, supplementing §6): `schema.json` plus
//! one `<tableName>.json` per non-empty table, both `serde_json`, rewritten
//! wholesale on checkpoint; and the WAL's opaque mutation payload codec.
//!
//! DDL is not WAL-journaled in this engine — only row mutations are
//! (§4.6 scopes the log to "every committed-transaction record" of table
//! data). A table created after the last checkpoint that hasn't been
//! checkpointed again is lost on crash along with its rows: `schema.json`
//! is the sole source of schema durability, and the WAL is purely a
//! data-mutation log.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use relite_ordmap::OrderedMap;
use relite_primitives::TableId;
use relite_schema::{Catalog, ColumnType as SchemaColumnType};
use relite_sql_ast::{ColumnDef, ColumnType as AstColumnType, ForeignKeyDef, Select, Statement, TriggerEvent, TriggerTiming};
use relite_wal::Record;
use serde::{Deserialize, Serialize};

use crate::engine::Storage;
use crate::error::{EngineResult, StorageError};
use crate::row::RowKeyCounter;

#[derive(Serialize, Deserialize)]
struct TableDoc {
    name: String,
    columns: Vec<ColumnDef>,
    foreign_keys: Vec<ForeignKeyDef>,
}

#[derive(Serialize, Deserialize)]
struct IndexDoc {
    name: String,
    table: String,
    columns: Vec<String>,
    unique: bool,
}

#[derive(Serialize, Deserialize)]
struct ViewDoc {
    name: String,
    query: Select,
}

#[derive(Serialize, Deserialize)]
struct TriggerDoc {
    name: String,
    table: String,
    timing: TriggerTiming,
    event: TriggerEvent,
    body: Vec<Statement>,
}

#[derive(Serialize, Deserialize)]
struct ProcedureDoc {
    name: String,
    params: Vec<String>,
    body: Vec<Statement>,
}

#[derive(Default, Serialize, Deserialize)]
struct SchemaDoc {
    tables: Vec<TableDoc>,
    indexes: Vec<IndexDoc>,
    views: Vec<ViewDoc>,
    triggers: Vec<TriggerDoc>,
    procedures: Vec<ProcedureDoc>,
}

#[derive(Serialize, Deserialize)]
struct TableDataDoc {
    keys: Vec<String>,
    values: Vec<String>,
}

/// Reads a persisted-state file, attaching the path to an I/O failure the
/// way the reference codebase's own storage layers annotate errors with
/// `anyhow::Context` before they surface to the caller.
fn read_persisted(path: &Path) -> EngineResult<Vec<u8>> {
    fs::read(path)
        .with_context(|| format!("reading persisted state from {}", path.display()))
        .map_err(|e| crate::error::EngineError::Storage(StorageError::Corrupt(e.to_string())))
}

fn ast_column_type(ty: SchemaColumnType) -> AstColumnType {
    match ty {
        SchemaColumnType::Integer => AstColumnType::Integer,
        SchemaColumnType::Real => AstColumnType::Real,
        SchemaColumnType::Text => AstColumnType::Text,
        SchemaColumnType::Blob => AstColumnType::Blob,
        SchemaColumnType::Boolean => AstColumnType::Boolean,
        SchemaColumnType::Json => AstColumnType::Json,
        SchemaColumnType::Date => AstColumnType::Date,
        SchemaColumnType::Timestamp => AstColumnType::Timestamp,
    }
}

fn table_data_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.json"))
}

fn build_schema_doc(catalog: &Catalog) -> SchemaDoc {
    let tables = catalog
        .tables()
        .map(|t| TableDoc {
            name: t.name.clone(),
            columns: t
                .columns
                .iter()
                .map(|c| ColumnDef {
                    name: c.name.clone(),
                    ty: ast_column_type(c.ty),
                    primary_key: c.primary_key,
                    auto_increment: c.auto_increment,
                    unique: c.unique,
                    not_null: c.not_null,
                    default: c.default.clone(),
                    check: c.check.clone(),
                })
                .collect(),
            foreign_keys: t.foreign_keys.clone(),
        })
        .collect();

    let indexes = catalog
        .indexes()
        .map(|idx| {
            let table = catalog.table_by_id(idx.table).expect("index references a live table");
            IndexDoc {
                name: idx.name.clone(),
                table: table.name.clone(),
                columns: idx.columns.iter().map(|c| table.columns[c.0 as usize].name.clone()).collect(),
                unique: idx.unique,
            }
        })
        .collect();

    let views = catalog.views().map(|v| ViewDoc { name: v.name.clone(), query: v.query.clone() }).collect();

    let triggers = catalog
        .triggers()
        .map(|t| {
            let table = catalog.table_by_id(t.table).expect("trigger references a live table");
            TriggerDoc { name: t.name.clone(), table: table.name.clone(), timing: t.timing, event: t.event, body: t.body.clone() }
        })
        .collect();

    let procedures =
        catalog.procedures().map(|p| ProcedureDoc { name: p.name.clone(), params: p.params.clone(), body: p.body.clone() }).collect();

    SchemaDoc { tables, indexes, views, triggers, procedures }
}

/// Writes `schema.json` and one `<tableName>.json` per non-empty table,
/// overwriting whatever was there (§4.9's "rewritten wholesale").
#[tracing::instrument(skip(catalog, storage))]
pub(crate) fn save(dir: &Path, catalog: &RwLock<Catalog>, storage: &Storage) -> EngineResult<()> {
    fs::create_dir_all(dir)?;
    let catalog = catalog.read();
    let doc = build_schema_doc(&catalog);
    fs::write(dir.join("schema.json"), serde_json::to_vec_pretty(&doc)?)?;

    for table in catalog.tables() {
        let path = table_data_path(dir, &table.name);
        let map = storage.table_map(table.id);
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (k, v) in map.scan_all() {
            keys.push(STANDARD.encode(k));
            values.push(STANDARD.encode(v));
        }
        if keys.is_empty() {
            let _ = fs::remove_file(&path);
            continue;
        }
        fs::write(&path, serde_json::to_vec(&TableDataDoc { keys, values })?)?;
    }
    log::info!("checkpointed schema and {} table(s) to {:?}", catalog.tables().count(), dir);
    Ok(())
}

/// Reconstructs the catalog from `schema.json` (if present), allocates
/// storage for every table/index it names, loads each table's row data,
/// advances the row-key counter past every loaded key, and rebuilds every
/// secondary index by scanning its table (§4.4.2 Open Question 1, §4.9).
#[tracing::instrument(skip(catalog, storage, counter))]
pub(crate) fn load(
    dir: &Path,
    catalog: &RwLock<Catalog>,
    storage: &Storage,
    counter: &RowKeyCounter,
    branching_factor: usize,
) -> EngineResult<()> {
    let schema_path = dir.join("schema.json");
    if !schema_path.exists() {
        return Ok(());
    }
    let doc: SchemaDoc = serde_json::from_slice(&read_persisted(&schema_path)?)?;

    let mut cat = catalog.write();
    for table in &doc.tables {
        let table_id = cat.create_table(&table.name, table.columns.clone(), table.foreign_keys.clone())?;
        storage.tables.write().insert(table_id, OrderedMap::with_branching_factor(branching_factor));
    }
    for view in &doc.views {
        cat.create_view(&view.name, view.query.clone())?;
    }
    for trigger in &doc.triggers {
        cat.create_trigger(&trigger.name, &trigger.table, trigger.timing, trigger.event, trigger.body.clone())?;
    }
    for proc in &doc.procedures {
        cat.create_procedure(&proc.name, proc.params.clone(), proc.body.clone())?;
    }
    for index in &doc.indexes {
        let index_id = cat.create_index(&index.name, &index.table, index.columns.clone(), index.unique)?;
        storage.indexes.write().insert(index_id, OrderedMap::with_branching_factor(branching_factor));
    }

    for table in cat.tables() {
        let path = table_data_path(dir, &table.name);
        if !path.exists() {
            continue;
        }
        let data: TableDataDoc = serde_json::from_slice(&read_persisted(&path)?)?;
        let map = storage.table_map(table.id);
        for (k, v) in data.keys.iter().zip(&data.values) {
            let key = STANDARD.decode(k).map_err(|e| StorageError::Corrupt(e.to_string()))?;
            let value = STANDARD.decode(v).map_err(|e| StorageError::Corrupt(e.to_string()))?;
            if let Some(n) = crate::row::decode_row_key(&key) {
                counter.observe(n);
            }
            map.put(&key, &value)?;
        }
    }
    drop(cat);

    let cat = catalog.read();
    let indexes: Vec<_> = cat.indexes().cloned().collect();
    for index in indexes {
        let table = cat.table_by_id(index.table).expect("index references a live table");
        let index_map = storage.index_map(index.id);
        if let Some(col) = index.columns.first() {
            for (row_key, bytes) in storage.table_map(table.id).scan_all() {
                let row = relite_sats::decode_row(&bytes)?;
                if let Some(value) = row.get(col.0 as usize) {
                    if !value.is_null() {
                        index_map.put(&value.coerce_text().into_bytes(), &row_key)?;
                    }
                }
            }
        }
    }
    log::info!("loaded schema and data from {dir:?}");
    Ok(())
}

/// Replays mutation records against already-allocated table storage
/// (§4.6's recovery). Records naming a table no longer (or not yet) known
/// to the catalog are skipped — see this module's note on DDL durability.
#[tracing::instrument(skip(records, catalog, storage, counter))]
pub(crate) fn replay(
    records: &[Record],
    catalog: &RwLock<Catalog>,
    storage: &Storage,
    counter: &RowKeyCounter,
) -> EngineResult<()> {
    let catalog = catalog.read();
    for record in records {
        match record.kind {
            relite_wal::WalType::Insert | relite_wal::WalType::Update => {
                let Some((table, key, Some(value))) = decode_mutation(&record.data) else { continue };
                if catalog.table_by_id(table).is_none() || !storage.tables.read().contains_key(&table) {
                    continue;
                }
                if let Some(n) = crate::row::decode_row_key(&key) {
                    counter.observe(n);
                }
                storage.table_map(table).put(&key, &value)?;
            }
            relite_wal::WalType::Delete => {
                let Some((table, key, _)) = decode_mutation(&record.data) else { continue };
                if catalog.table_by_id(table).is_none() || !storage.tables.read().contains_key(&table) {
                    continue;
                }
                let _ = storage.table_map(table).delete(&key);
            }
            relite_wal::WalType::Commit | relite_wal::WalType::Rollback | relite_wal::WalType::Checkpoint => {}
        }
    }
    Ok(())
}

fn encode_mutation(table: TableId, key: &[u8], value: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + key.len() + value.map_or(0, |v| v.len() + 4));
    buf.extend_from_slice(&table.0.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    if let Some(v) = value {
        buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        buf.extend_from_slice(v);
    }
    buf
}

fn decode_mutation(data: &[u8]) -> Option<(TableId, Vec<u8>, Option<Vec<u8>>)> {
    if data.len() < 8 {
        return None;
    }
    let table = TableId(u32::from_le_bytes(data[0..4].try_into().ok()?));
    let key_len = u32::from_le_bytes(data[4..8].try_into().ok()?) as usize;
    let rest = &data[8..];
    if rest.len() < key_len {
        return None;
    }
    let key = rest[..key_len].to_vec();
    let rest = &rest[key_len..];
    if rest.is_empty() {
        return Some((table, key, None));
    }
    if rest.len() < 4 {
        return None;
    }
    let value_len = u32::from_le_bytes(rest[0..4].try_into().ok()?) as usize;
    let value_bytes = &rest[4..];
    if value_bytes.len() < value_len {
        return None;
    }
    Some((table, key, Some(value_bytes[..value_len].to_vec())))
}

pub(crate) fn encode_wal_insert(table: TableId, key: &[u8], value: &[u8]) -> Vec<u8> {
    encode_mutation(table, key, Some(value))
}

pub(crate) fn encode_wal_delete(table: TableId, key: &[u8]) -> Vec<u8> {
    encode_mutation(table, key, None)
}

pub(crate) fn encode_wal_mutation(table: TableId, key: &[u8], write: &relite_txn::Write) -> Vec<u8> {
    match write {
        relite_txn::Write::Put(value) => encode_mutation(table, key, Some(value)),
        relite_txn::Write::Delete => encode_mutation(table, key, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_round_trips_with_and_without_value() {
        let encoded = encode_wal_insert(TableId(3), b"key", b"value");
        assert_eq!(decode_mutation(&encoded), Some((TableId(3), b"key".to_vec(), Some(b"value".to_vec()))));

        let encoded = encode_wal_delete(TableId(3), b"key");
        assert_eq!(decode_mutation(&encoded), Some((TableId(3), b"key".to_vec(), None)));
    }

    #[test]
    fn schema_round_trips_through_json() {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                "t",
                vec![ColumnDef {
                    name: "id".into(),
                    ty: AstColumnType::Integer,
                    primary_key: true,
                    auto_increment: true,
                    unique: false,
                    not_null: true,
                    default: None,
                    check: None,
                }],
                Vec::new(),
            )
            .unwrap();
        let doc = build_schema_doc(&catalog);
        let json = serde_json::to_string(&doc).unwrap();
        let reloaded: SchemaDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.tables.len(), 1);
        assert_eq!(reloaded.tables[0].name, "t");
    }
}
