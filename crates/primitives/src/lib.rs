//! Small `u32`/`usize` id newtypes used across the catalog and executor.
//!
//! A leaf crate with no dependencies besides `derive_more`, imported by
//! every higher layer that needs to name a table, column, or index
//! without carrying a `String` around.

use derive_more::{Display, From, Into};

/// Identifies a table within a catalog. Stable for the lifetime of the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct TableId(pub u32);

/// Identifies a secondary index within a catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct IndexId(pub u32);

/// Identifies a view within a catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct ViewId(pub u32);

/// Identifies a trigger within a catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct TriggerId(pub u32);

/// Identifies a stored procedure within a catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct ProcedureId(pub u32);

/// A column's position within its table's declared column list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct ColId(pub u32);

/// A 64-bit transaction identifier, also used as a transaction's start timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct TxId(pub u64);

/// A write-ahead log sequence number. Strictly increasing across the log's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct Lsn(pub u64);

impl TxId {
    pub fn next(self) -> TxId {
        TxId(self.0 + 1)
    }
}

impl Lsn {
    pub fn next(self) -> Lsn {
        Lsn(self.0 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        assert!(TableId(1) < TableId(2));
        assert!(Lsn(9) < Lsn(10));
    }

    #[test]
    fn tx_and_lsn_increment() {
        assert_eq!(TxId(5).next(), TxId(6));
        assert_eq!(Lsn(5).next(), Lsn(6));
    }
}
