//! Write-ahead log: append-only typed record journal, recovery, checkpoint (§4.6).

mod error;
mod record;
mod wal;

pub use error::WalError;
pub use record::{Record, WalType};
pub use wal::{Recovery, SyncMode, Wal};
