//! Snapshot-isolation transaction manager: lifecycle, read/write sets,
//! conflict detection on commit (§4.5).

mod error;
mod manager;
mod transaction;

pub use error::TxnError;
pub use manager::TransactionManager;
pub use transaction::{Isolation, Key, Transaction, TxOptions, TxState, Write};
