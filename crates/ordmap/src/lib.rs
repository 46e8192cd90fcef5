//! The single ordered key/value container underneath every table and every
//! secondary index (§4.1). A classical B+Tree guarded by one shared-exclusive
//! lock: readers (`get`, `scan`) take shared access, writers (`put`,
//! `delete`) take exclusive access, mirroring the per-ordered-map lock the
//! reference engine's `locking_tx_datastore` keeps per table.

mod btree;
mod error;
mod iter;

use parking_lot::RwLock;
use std::sync::Arc;

use btree::Tree;
pub use error::MapError;
pub use iter::ScanIter;

/// Default branching factor used when an implementation detail doesn't
/// otherwise dictate a smaller one (tests commonly use 3-5 to exercise
/// splitting cheaply).
pub const DEFAULT_BRANCHING_FACTOR: usize = 100;

/// A B+Tree-backed ordered map from non-empty byte strings to byte strings.
///
/// Cheaply cloneable: clones share the same underlying tree (`Arc` +
/// `RwLock`), matching how a table and each of its secondary indexes are
/// handed out by the catalog without copying their contents.
#[derive(Clone)]
pub struct OrderedMap {
    inner: Arc<RwLock<Tree>>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::with_branching_factor(DEFAULT_BRANCHING_FACTOR)
    }

    pub fn with_branching_factor(branching_factor: usize) -> Self {
        OrderedMap { inner: Arc::new(RwLock::new(Tree::new(branching_factor))) }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, MapError> {
        if key.is_empty() {
            return Err(MapError::InvalidKey);
        }
        Ok(self.inner.read().get(key))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), MapError> {
        if key.is_empty() {
            return Err(MapError::InvalidKey);
        }
        self.inner.write().put(key, value);
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), MapError> {
        if key.is_empty() {
            return Err(MapError::InvalidKey);
        }
        if self.inner.write().delete(key) {
            Ok(())
        } else {
            Err(MapError::NotFound)
        }
    }

    /// Takes a consistent snapshot of `[lo, hi)` (unbounded ends when
    /// `None`) and returns an iterator over it. See [`ScanIter`].
    pub fn scan(&self, lo: Option<&[u8]>, hi: Option<&[u8]>) -> ScanIter {
        let items = self.inner.read().scan(lo, hi);
        ScanIter::new(items)
    }

    pub fn scan_all(&self) -> ScanIter {
        self.scan(None, None)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OrderedMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected_everywhere() {
        let m = OrderedMap::new();
        assert_eq!(m.get(b"").unwrap_err(), MapError::InvalidKey);
        assert_eq!(m.put(b"", b"x").unwrap_err(), MapError::InvalidKey);
        assert_eq!(m.delete(b"").unwrap_err(), MapError::InvalidKey);
    }

    #[test]
    fn get_reflects_put_until_delete() {
        let m = OrderedMap::new();
        m.put(b"k1", b"v1").unwrap();
        assert_eq!(m.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        m.delete(b"k1").unwrap();
        assert_eq!(m.get(b"k1").unwrap(), None);
    }

    #[test]
    fn delete_missing_key_is_not_found() {
        let m = OrderedMap::new();
        assert_eq!(m.delete(b"nope").unwrap_err(), MapError::NotFound);
    }

    #[test]
    fn scan_orders_ascending_and_is_a_stable_snapshot() {
        let m = OrderedMap::with_branching_factor(4);
        for i in 0..30u32 {
            m.put(format!("{:04}", i).as_bytes(), b"v").unwrap();
        }
        let mut it = m.scan(None, None);
        // Mutate after the snapshot is taken; the outstanding iterator must
        // not observe it.
        m.put(b"9999", b"late").unwrap();

        let mut count = 0;
        while it.has_next() {
            it.next_pair().unwrap();
            count += 1;
        }
        assert_eq!(count, 30);

        it.first();
        assert!(it.has_next());
    }

    #[test]
    fn clone_shares_the_same_tree() {
        let m = OrderedMap::new();
        let m2 = m.clone();
        m.put(b"a", b"1").unwrap();
        assert_eq!(m2.get(b"a").unwrap(), Some(b"1".to_vec()));
    }
}
