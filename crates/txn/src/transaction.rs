use std::collections::HashMap;

use relite_primitives::{TableId, TxId};

/// A row key, qualified by the table it belongs to, as tracked in a
/// transaction's read/write sets (§4.5).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub table: TableId,
    pub row_key: Vec<u8>,
}

impl Key {
    pub fn new(table: TableId, row_key: impl Into<Vec<u8>>) -> Key {
        Key { table, row_key: row_key.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Isolation {
    ReadCommitted,
    #[default]
    SnapshotIsolation,
    Serializable,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Isolation,
    pub read_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    Aborted,
}

/// A write buffered in a transaction's write set. `None` represents a
/// buffered delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Write {
    Put(Vec<u8>),
    Delete,
}

/// An in-flight transaction's state: its identity, isolation, and the
/// read/write sets accumulated so far (§4.5). Buffered writes are not
/// visible to other transactions until [`crate::TransactionManager::commit`]
/// succeeds.
#[derive(Debug)]
pub struct Transaction {
    pub id: TxId,
    pub options: TxOptions,
    pub state: TxState,
    /// Key -> version (the committed `TxId` last observed) as of the first
    /// read of that key in this transaction.
    pub(crate) read_set: HashMap<Key, TxId>,
    pub(crate) write_set: HashMap<Key, Write>,
}

impl Transaction {
    pub(crate) fn new(id: TxId, options: TxOptions) -> Transaction {
        Transaction { id, options, state: TxState::Active, read_set: HashMap::new(), write_set: HashMap::new() }
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    /// Looks up a pending write for `key`, if this transaction has buffered
    /// one; callers should fall through to the committed backend on `None`.
    pub fn pending_write(&self, key: &Key) -> Option<&Write> {
        self.write_set.get(key)
    }

    /// Iterates every buffered write in this transaction, in no particular
    /// order. Used by the engine's read-your-own-writes overlay (§4.5).
    pub fn write_set(&self) -> impl Iterator<Item = (&Key, &Write)> {
        self.write_set.iter()
    }

    /// Buffered writes scoped to a single table, for scanning a table
    /// through an open transaction's overlay.
    pub fn writes_for_table(&self, table: TableId) -> impl Iterator<Item = (&Key, &Write)> {
        self.write_set.iter().filter(move |(k, _)| k.table == table)
    }

    /// Whether this transaction has buffered a read of `key`.
    pub fn has_read(&self, key: &Key) -> bool {
        self.read_set.contains_key(key)
    }
}
