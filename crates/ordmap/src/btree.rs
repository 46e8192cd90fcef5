//! The B+Tree itself: node layout, point operations, and range collection.
//!
//! Internal nodes hold separator keys and child pointers; leaves hold keys
//! and values directly. A node overflows once it holds `branching_factor`
//! keys and splits, promoting the median key (for leaves: the first key of
//! the new right leaf, so it remains present in the leaf itself; for
//! internal nodes: the true median, which is removed from both halves and
//! pushed up). Delete only removes the leaf entry; no merge/rebalance is
//! performed on underflow (§9, resolved: an accepted simplicity trade-off,
//! not a defect — see `DESIGN.md`).

pub type Key = Vec<u8>;
pub type Val = Vec<u8>;

#[derive(Debug)]
pub(crate) enum Node {
    Leaf {
        keys: Vec<Key>,
        values: Vec<Val>,
    },
    Internal {
        keys: Vec<Key>,
        children: Vec<Box<Node>>,
    },
}

pub(crate) enum InsertOutcome {
    /// Key already existed; the tree's live-key counter should not change.
    Replaced,
    /// Key was newly inserted; the tree's live-key counter increments.
    Inserted,
    /// The node overflowed and split; the caller (parent, or the `Tree`
    /// owner if this was the root) must absorb `(separator, right)`.
    Split { separator: Key, right: Box<Node> },
}

impl Node {
    fn new_leaf() -> Self {
        Node::Leaf { keys: vec![], values: vec![] }
    }

    /// Index of the child that would contain `key`. Equality on a separator
    /// directs the search to the right child, so this is the count of
    /// separators `<= key`.
    fn child_index(keys: &[Key], key: &[u8]) -> usize {
        keys.partition_point(|k| k.as_slice() <= key)
    }

    fn get(&self, key: &[u8]) -> Option<Val> {
        match self {
            Node::Leaf { keys, values } => {
                let pos = keys.partition_point(|k| k.as_slice() < key);
                if pos < keys.len() && keys[pos].as_slice() == key {
                    Some(values[pos].clone())
                } else {
                    None
                }
            }
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, key);
                children[idx].get(key)
            }
        }
    }

    fn insert(&mut self, key: &[u8], value: &[u8], branching_factor: usize) -> InsertOutcome {
        let max_keys = branching_factor.saturating_sub(1).max(1);
        match self {
            Node::Leaf { keys, values } => {
                let pos = keys.partition_point(|k| k.as_slice() < key);
                if pos < keys.len() && keys[pos].as_slice() == key {
                    values[pos] = value.to_vec();
                    return InsertOutcome::Replaced;
                }
                keys.insert(pos, key.to_vec());
                values.insert(pos, value.to_vec());
                if keys.len() > max_keys {
                    let mid = keys.len() / 2;
                    let right_keys = keys.split_off(mid);
                    let right_values = values.split_off(mid);
                    let separator = right_keys[0].clone();
                    let right = Box::new(Node::Leaf { keys: right_keys, values: right_values });
                    InsertOutcome::Split { separator, right }
                } else {
                    InsertOutcome::Inserted
                }
            }
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, key);
                match children[idx].insert(key, value, branching_factor) {
                    InsertOutcome::Split { separator, right } => {
                        keys.insert(idx, separator);
                        children.insert(idx + 1, right);
                        if keys.len() > max_keys {
                            let mid = keys.len() / 2;
                            let up = keys[mid].clone();
                            let right_keys = keys.split_off(mid + 1);
                            keys.pop(); // drop the promoted key from the left half
                            let right_children = children.split_off(mid + 1);
                            let right =
                                Box::new(Node::Internal { keys: right_keys, children: right_children });
                            InsertOutcome::Split { separator: up, right }
                        } else {
                            InsertOutcome::Inserted
                        }
                    }
                    other => other,
                }
            }
        }
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        match self {
            Node::Leaf { keys, values } => {
                let pos = keys.partition_point(|k| k.as_slice() < key);
                if pos < keys.len() && keys[pos].as_slice() == key {
                    keys.remove(pos);
                    values.remove(pos);
                    true
                } else {
                    false
                }
            }
            Node::Internal { keys, children } => {
                let idx = Self::child_index(keys, key);
                children[idx].delete(key)
            }
        }
    }

    /// Appends every `(key, value)` pair in `[lo, hi)` to `out`, in
    /// ascending key order. Bounds `None` mean unbounded. Internal
    /// separators prune whole subtrees that cannot intersect the range.
    fn collect_range(&self, lo: Option<&[u8]>, hi: Option<&[u8]>, out: &mut Vec<(Key, Val)>) {
        match self {
            Node::Leaf { keys, values } => {
                for (k, v) in keys.iter().zip(values.iter()) {
                    let above_lo = lo.map_or(true, |l| k.as_slice() >= l);
                    let below_hi = hi.map_or(true, |h| k.as_slice() < h);
                    if above_lo && below_hi {
                        out.push((k.clone(), v.clone()));
                    }
                }
            }
            Node::Internal { keys, children } => {
                for (i, child) in children.iter().enumerate() {
                    let left_bound = if i == 0 { None } else { Some(keys[i - 1].as_slice()) };
                    let right_bound = keys.get(i).map(|k| k.as_slice());
                    if let (Some(rb), Some(l)) = (right_bound, lo) {
                        if rb <= l {
                            continue;
                        }
                    }
                    if let (Some(lb), Some(h)) = (left_bound, hi) {
                        if lb >= h {
                            break;
                        }
                    }
                    child.collect_range(lo, hi, out);
                }
            }
        }
    }
}

/// The tree proper: a root node, the configured branching factor, and a
/// live-key counter maintained independently of node contents (so `len()`
/// is O(1)).
pub(crate) struct Tree {
    root: Node,
    branching_factor: usize,
    len: usize,
}

impl Tree {
    pub(crate) fn new(branching_factor: usize) -> Self {
        Tree { root: Node::new_leaf(), branching_factor: branching_factor.max(2), len: 0 }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Val> {
        self.root.get(key)
    }

    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) {
        match self.root.insert(key, value, self.branching_factor) {
            InsertOutcome::Inserted => self.len += 1,
            InsertOutcome::Replaced => {}
            InsertOutcome::Split { separator, right } => {
                self.len += 1;
                let old_root = std::mem::replace(&mut self.root, Node::new_leaf());
                self.root = Node::Internal {
                    keys: vec![separator],
                    children: vec![Box::new(old_root), right],
                };
            }
        }
    }

    pub(crate) fn delete(&mut self, key: &[u8]) -> bool {
        let removed = self.root.delete(key);
        if removed {
            self.len -= 1;
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn scan(&self, lo: Option<&[u8]>, hi: Option<&[u8]>) -> Vec<(Key, Val)> {
        let mut out = Vec::new();
        self.root.collect_range(lo, hi, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(n: u32) -> Key {
        format!("{:010}", n).into_bytes()
    }

    #[test]
    fn insert_and_get_round_trips() {
        let mut t = Tree::new(4);
        for i in 0..50 {
            t.put(&k(i), format!("v{i}").as_bytes());
        }
        assert_eq!(t.len(), 50);
        for i in 0..50 {
            assert_eq!(t.get(&k(i)), Some(format!("v{i}").into_bytes()));
        }
        assert_eq!(t.get(&k(999)), None);
    }

    #[test]
    fn put_overwrites_without_growing_len() {
        let mut t = Tree::new(4);
        t.put(b"a", b"1");
        t.put(b"a", b"2");
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(b"a"), Some(b"2".to_vec()));
    }

    #[test]
    fn delete_removes_entry() {
        let mut t = Tree::new(4);
        t.put(b"a", b"1");
        assert!(t.delete(b"a"));
        assert_eq!(t.get(b"a"), None);
        assert!(!t.delete(b"a"));
    }

    #[test]
    fn scan_yields_ascending_order_after_many_splits() {
        let mut t = Tree::new(3);
        let mut order: Vec<u32> = (0..200).collect();
        // insert out of order to exercise splitting at all depths
        order.reverse();
        for i in &order {
            t.put(&k(*i), b"x");
        }
        let all = t.scan(None, None);
        assert_eq!(all.len(), 200);
        for w in all.windows(2) {
            assert!(w[0].0 < w[1].0);
        }
    }

    #[test]
    fn scan_respects_bounds() {
        let mut t = Tree::new(5);
        for i in 0..20 {
            t.put(&k(i), b"x");
        }
        let mid = t.scan(Some(&k(5)), Some(&k(10)));
        assert_eq!(mid.len(), 5);
        assert_eq!(mid[0].0, k(5));
        assert_eq!(mid.last().unwrap().0, k(9));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    proptest! {
        #[test]
        fn tree_matches_a_reference_map_after_arbitrary_inserts_and_deletes(
            ops in proptest::collection::vec((any::<u16>(), any::<u8>(), any::<bool>()), 0..200),
            branching_factor in 2usize..8,
        ) {
            let mut tree = Tree::new(branching_factor);
            let mut reference: BTreeMap<u16, u8> = BTreeMap::new();

            for (key, value, is_delete) in ops {
                let key_bytes = key.to_be_bytes();
                if is_delete {
                    let removed_tree = tree.delete(&key_bytes);
                    let removed_ref = reference.remove(&key).is_some();
                    prop_assert_eq!(removed_tree, removed_ref);
                } else {
                    tree.put(&key_bytes, &[value]);
                    reference.insert(key, value);
                }
            }

            prop_assert_eq!(tree.len(), reference.len());
            let scanned = tree.scan(None, None);
            let expected: Vec<(Key, Val)> =
                reference.iter().map(|(k, v)| (k.to_be_bytes().to_vec(), vec![*v])).collect();
            prop_assert_eq!(scanned, expected);
        }
    }
}
