use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use relite_primitives::TxId;

use crate::error::TxnError;
use crate::transaction::{Isolation, Key, Transaction, TxOptions, TxState, Write};

/// Owns the active-transaction set and the per-key committed-version
/// table, and performs snapshot-isolation conflict detection on commit
/// (§4.5). Grounded on the reference engine's locking transaction
/// datastore, simplified from its row-pointer/table-structure tracking
/// down to the spec's flat key-version model.
pub struct TransactionManager {
    next_id: AtomicU64,
    active: Mutex<HashSet<TxId>>,
    /// Latest committed version (the committing transaction's id) per key.
    versions: Mutex<HashMap<Key, TxId>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        TransactionManager { next_id: AtomicU64::new(1), active: Mutex::new(HashSet::new()), versions: Mutex::new(HashMap::new()) }
    }
}

impl TransactionManager {
    pub fn new() -> TransactionManager {
        TransactionManager::default()
    }

    /// Begins a new transaction with a fresh, strictly increasing id that
    /// also serves as its start timestamp.
    #[tracing::instrument(skip(self))]
    pub fn begin(&self, options: TxOptions) -> Transaction {
        let id = TxId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.active.lock().insert(id);
        log::debug!("begin tx {id} isolation={:?} read_only={}", options.isolation, options.read_only);
        Transaction::new(id, options)
    }

    /// Records that `tx` observed `key` at its currently committed version,
    /// for later conflict detection. A no-op for keys already in the read
    /// set (the first-observed version is the one that matters).
    pub fn record_read(&self, tx: &mut Transaction, key: Key) {
        if tx.read_set.contains_key(&key) {
            return;
        }
        let version = self.versions.lock().get(&key).copied().unwrap_or(TxId(0));
        tx.read_set.insert(key, version);
    }

    pub fn record_put(&self, tx: &mut Transaction, key: Key, value: Vec<u8>) {
        tx.write_set.insert(key, Write::Put(value));
    }

    pub fn record_delete(&self, tx: &mut Transaction, key: Key) {
        tx.write_set.insert(key, Write::Delete);
    }

    /// Commits `tx`. For snapshot isolation and stronger, aborts with
    /// `Conflict` if any read-set key's committed version has advanced past
    /// this transaction's start timestamp; read-committed never conflicts.
    /// On success, every write-set key's committed version advances to
    /// `tx.id` and the write set is returned to the caller to apply to the
    /// backend.
    #[tracing::instrument(skip(self, tx))]
    pub fn commit(&self, tx: &mut Transaction) -> Result<HashMap<Key, Write>, TxnError> {
        match tx.state {
            TxState::Committed => return Err(TxnError::AlreadyCommitted(tx.id)),
            TxState::Aborted => return Err(TxnError::AlreadyAborted(tx.id)),
            TxState::Active => {}
        }

        if tx.options.isolation != Isolation::ReadCommitted {
            let versions = self.versions.lock();
            for (key, observed) in &tx.read_set {
                let latest = versions.get(key).copied().unwrap_or(TxId(0));
                if latest > *observed {
                    drop(versions);
                    tx.state = TxState::Aborted;
                    self.active.lock().remove(&tx.id);
                    return Err(TxnError::Conflict(tx.id));
                }
            }
        }

        let mut versions = self.versions.lock();
        for key in tx.write_set.keys() {
            versions.insert(key.clone(), tx.id);
        }
        drop(versions);

        tx.state = TxState::Committed;
        self.active.lock().remove(&tx.id);
        log::debug!("committed tx {}", tx.id);
        Ok(std::mem::take(&mut tx.write_set))
    }

    /// Drops both sets and moves to `Aborted`. Idempotent from `Aborted`;
    /// illegal from `Committed`.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<(), TxnError> {
        match tx.state {
            TxState::Committed => return Err(TxnError::AlreadyCommitted(tx.id)),
            TxState::Aborted => return Ok(()),
            TxState::Active => {}
        }
        tx.read_set.clear();
        tx.write_set.clear();
        tx.state = TxState::Aborted;
        self.active.lock().remove(&tx.id);
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> Key {
        Key::new(relite_primitives::TableId(0), vec![n])
    }

    #[test]
    fn commit_advances_versions_for_written_keys() {
        let mgr = TransactionManager::new();
        let mut tx = mgr.begin(TxOptions::default());
        mgr.record_put(&mut tx, key(1), b"v1".to_vec());
        let writes = mgr.commit(&mut tx).unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(mgr.versions.lock()[&key(1)], tx.id);
    }

    #[test]
    fn snapshot_conflict_when_read_key_advances_before_commit() {
        let mgr = TransactionManager::new();

        let mut writer = mgr.begin(TxOptions::default());
        mgr.record_put(&mut writer, key(1), b"seed".to_vec());
        mgr.commit(&mut writer).unwrap();

        let mut tx_a = mgr.begin(TxOptions::default());
        let mut tx_b = mgr.begin(TxOptions::default());
        mgr.record_read(&mut tx_a, key(1));
        mgr.record_read(&mut tx_b, key(1));
        mgr.record_put(&mut tx_a, key(1), b"a".to_vec());
        mgr.record_put(&mut tx_b, key(1), b"b".to_vec());

        mgr.commit(&mut tx_a).unwrap();
        let result = mgr.commit(&mut tx_b);
        assert_eq!(result, Err(TxnError::Conflict(tx_b.id)));
    }

    #[test]
    fn rollback_is_idempotent_but_illegal_after_commit() {
        let mgr = TransactionManager::new();
        let mut tx = mgr.begin(TxOptions::default());
        mgr.rollback(&mut tx).unwrap();
        mgr.rollback(&mut tx).unwrap();

        let mut tx2 = mgr.begin(TxOptions::default());
        mgr.commit(&mut tx2).unwrap();
        assert_eq!(mgr.rollback(&mut tx2), Err(TxnError::AlreadyCommitted(tx2.id)));
    }

    #[test]
    fn read_committed_never_conflicts() {
        let mgr = TransactionManager::new();
        let mut writer = mgr.begin(TxOptions::default());
        mgr.record_put(&mut writer, key(1), b"seed".to_vec());
        mgr.commit(&mut writer).unwrap();

        let opts = TxOptions { isolation: Isolation::ReadCommitted, read_only: false };
        let mut tx_a = mgr.begin(opts);
        let mut tx_b = mgr.begin(opts);
        mgr.record_read(&mut tx_a, key(1));
        mgr.record_read(&mut tx_b, key(1));
        mgr.record_put(&mut tx_a, key(1), b"a".to_vec());
        mgr.record_put(&mut tx_b, key(1), b"b".to_vec());

        mgr.commit(&mut tx_a).unwrap();
        assert!(mgr.commit(&mut tx_b).is_ok());
    }
}
