//! The scan iterator: a materialized snapshot taken under the map's read
//! lock at scan start. Subsequent mutations never affect an outstanding
//! scan, and the snapshot can be replayed from the beginning via
//! [`ScanIter::first`].

use crate::btree::{Key, Val};

pub struct ScanIter {
    items: Vec<(Key, Val)>,
    pos: usize,
}

impl ScanIter {
    pub(crate) fn new(items: Vec<(Key, Val)>) -> Self {
        ScanIter { items, pos: 0 }
    }

    /// Pure predicate: true iff another pair remains.
    pub fn has_next(&self) -> bool {
        self.pos < self.items.len()
    }

    /// Advances the cursor and returns the pair it was pointing at, or
    /// `None` once exhausted.
    pub fn next_pair(&mut self) -> Option<(Key, Val)> {
        if self.pos < self.items.len() {
            let pair = self.items[self.pos].clone();
            self.pos += 1;
            Some(pair)
        } else {
            None
        }
    }

    /// Resets the cursor to the start of the snapshot.
    pub fn first(&mut self) {
        self.pos = 0;
    }

    /// Releases the snapshot. A no-op beyond dropping `self`, since the
    /// snapshot owns its data independently of the tree.
    pub fn close(self) {}

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for ScanIter {
    type Item = (Key, Val);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_pair()
    }
}
