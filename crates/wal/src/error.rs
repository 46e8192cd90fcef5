use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalError {
    #[error("wal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("short read: expected {expected} bytes, found {found}")]
    ShortRead { expected: usize, found: usize },
    #[error("corrupt record at byte offset {offset}: checksum mismatch")]
    ChecksumMismatch { offset: u64 },
    #[error("corrupt record at byte offset {offset}: unknown record type {tag}")]
    UnknownRecordType { offset: u64, tag: u8 },
}
