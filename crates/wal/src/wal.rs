use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{ByteOrder, LittleEndian};
use relite_primitives::{Lsn, TxId};

use crate::error::WalError;
use crate::record::{Record, WalType};

const LEN_PREFIX: usize = 4;

/// Flush policy for [`Wal::append`], mirrored from §4.8's `DbOptions`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    Off,
    Normal,
    #[default]
    Full,
}

/// Outcome of scanning the log on open: the records that must be replayed
/// against the catalog, and the log's resume position.
pub struct Recovery {
    pub records: Vec<Record>,
    pub next_lsn: Lsn,
    pub checkpoint_lsn: Lsn,
}

/// An append-only, length-prefixed, checksummed journal of catalog
/// mutations (§4.6). Unlike the reference engine's segmented commit log,
/// this keeps a single file per database — the engine's scale does not
/// warrant segment rotation, and recovery here only needs to scan once on
/// open rather than support arbitrary offset-indexed reads.
pub struct Wal {
    path: PathBuf,
    file: BufWriter<File>,
    next_lsn: AtomicU64,
    checkpoint_lsn: AtomicU64,
    sync_mode: SyncMode,
}

impl Wal {
    /// Opens (creating if absent) the WAL file at `path`, repairing a
    /// truncated tail record left by a crash mid-append, and returns the
    /// set of records a caller must replay to catch the catalog up.
    #[tracing::instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> Result<(Wal, Recovery), WalError> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (all_records, valid_len) = Self::scan(&path)?;

        let file = fs::OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        file.set_len(valid_len)?;
        let mut file = file;
        file.seek(SeekFrom::End(0))?;

        let checkpoint_lsn =
            all_records.iter().rev().find(|r| r.kind == WalType::Checkpoint).map(|r| r.lsn).unwrap_or(Lsn(0));
        let next_lsn = all_records.last().map(|r| r.lsn.next()).unwrap_or(Lsn(1));

        let records = replayable(&all_records, checkpoint_lsn);

        log::debug!(
            "recovered wal at {}: {} records to replay, resuming at lsn {}",
            path.display(),
            records.len(),
            next_lsn.0
        );

        let wal = Wal {
            path,
            file: BufWriter::new(file),
            next_lsn: AtomicU64::new(next_lsn.0),
            checkpoint_lsn: AtomicU64::new(checkpoint_lsn.0),
            sync_mode,
        };
        Ok((wal, Recovery { records, next_lsn, checkpoint_lsn }))
    }

    /// Scans the file front to back, returning every record that decoded
    /// cleanly and the byte length up to the end of the last good record
    /// (a truncation point that discards an incomplete tail write).
    fn scan(path: &Path) -> Result<(Vec<Record>, u64), WalError> {
        if !path.exists() {
            return Ok((Vec::new(), 0));
        }
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;
        loop {
            let mut len_buf = [0u8; LEN_PREFIX];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let payload_len = LittleEndian::read_u32(&len_buf) as usize;
            let mut payload = vec![0u8; payload_len];
            if reader.read_exact(&mut payload).is_err() {
                // Truncated tail write from a crash mid-append; stop here.
                break;
            }
            match Record::decode(&payload, offset) {
                Ok(record) => {
                    records.push(record);
                    offset += (LEN_PREFIX + payload_len) as u64;
                }
                Err(_) => break,
            }
        }
        Ok((records, offset))
    }

    /// Appends a record, assigning it the next strictly increasing LSN.
    /// Durability before returning depends on [`SyncMode`]: `Full` fsyncs
    /// every append, `Normal` leaves group-commit flushing to the caller
    /// (who should call [`Wal::flush`] at transaction boundaries), `Off`
    /// never flushes proactively.
    #[tracing::instrument(skip(self, data))]
    pub fn append(&mut self, txn_id: TxId, kind: WalType, data: Vec<u8>) -> Result<Lsn, WalError> {
        let lsn = Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst));
        let record = Record { lsn, txn_id, kind, data };
        let payload = record.encode();
        self.file.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.file.write_all(&payload)?;
        match self.sync_mode {
            SyncMode::Off => {}
            SyncMode::Normal if kind == WalType::Commit || kind == WalType::Checkpoint => self.sync_all()?,
            SyncMode::Normal => {}
            SyncMode::Full => self.sync_all()?,
        }
        Ok(lsn)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        Ok(())
    }

    pub fn sync_all(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Writes a `Checkpoint` record and advances the checkpoint LSN.
    /// Callers must have already flushed all dirty catalog state to the
    /// backend (§4.6) before calling this.
    #[tracing::instrument(skip(self))]
    pub fn checkpoint(&mut self) -> Result<Lsn, WalError> {
        let lsn = self.append(TxId(0), WalType::Checkpoint, Vec::new())?;
        self.checkpoint_lsn.store(lsn.0, Ordering::SeqCst);
        self.sync_all()?;
        Ok(lsn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint_lsn(&self) -> Lsn {
        Lsn(self.checkpoint_lsn.load(Ordering::SeqCst))
    }

    pub fn next_lsn(&self) -> Lsn {
        Lsn(self.next_lsn.load(Ordering::SeqCst))
    }
}

/// Filters `records` (all records after `checkpoint_lsn`) down to the
/// mutation records (`Insert`/`Update`/`Delete`) belonging to transactions
/// that reached a `Commit` record; mutations of transactions that
/// rolled back or never closed are dropped (§4.6).
fn replayable(records: &[Record], checkpoint_lsn: Lsn) -> Vec<Record> {
    let tail: Vec<&Record> = records.iter().filter(|r| r.lsn > checkpoint_lsn).collect();
    let mut committed: HashSet<TxId> = HashSet::new();
    let mut rolled_back: HashSet<TxId> = HashSet::new();
    for r in &tail {
        match r.kind {
            WalType::Commit => {
                committed.insert(r.txn_id);
            }
            WalType::Rollback => {
                rolled_back.insert(r.txn_id);
            }
            _ => {}
        }
    }
    let _ = &rolled_back;
    let mut by_txn: HashMap<TxId, Vec<Record>> = HashMap::new();
    for r in &tail {
        if matches!(r.kind, WalType::Insert | WalType::Update | WalType::Delete) {
            by_txn.entry(r.txn_id).or_default().push((*r).clone());
        }
    }
    let mut out: Vec<Record> = committed
        .iter()
        .filter_map(|txn| by_txn.remove(txn))
        .flatten()
        .collect();
    out.sort_by_key(|r| r.lsn);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replays_only_committed_transactions_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        let (mut wal, recovery) = Wal::open(&path, SyncMode::Full).unwrap();
        assert!(recovery.records.is_empty());

        wal.append(TxId(1), WalType::Insert, b"row-a".to_vec()).unwrap();
        wal.append(TxId(1), WalType::Commit, Vec::new()).unwrap();
        wal.append(TxId(2), WalType::Insert, b"row-b".to_vec()).unwrap();
        wal.append(TxId(2), WalType::Rollback, Vec::new()).unwrap();
        wal.sync_all().unwrap();
        drop(wal);

        let (_wal, recovery) = Wal::open(&path, SyncMode::Full).unwrap();
        assert_eq!(recovery.records.len(), 1);
        assert_eq!(recovery.records[0].data, b"row-a");
    }

    #[test]
    fn checkpoint_advances_recovery_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        let (mut wal, _) = Wal::open(&path, SyncMode::Full).unwrap();
        wal.append(TxId(1), WalType::Insert, b"row-a".to_vec()).unwrap();
        wal.append(TxId(1), WalType::Commit, Vec::new()).unwrap();
        wal.checkpoint().unwrap();
        wal.append(TxId(2), WalType::Insert, b"row-b".to_vec()).unwrap();
        wal.append(TxId(2), WalType::Commit, Vec::new()).unwrap();
        drop(wal);

        let (_wal, recovery) = Wal::open(&path, SyncMode::Full).unwrap();
        assert_eq!(recovery.records.len(), 1);
        assert_eq!(recovery.records[0].data, b"row-b");
    }

    #[test]
    fn discards_truncated_tail_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");

        let (mut wal, _) = Wal::open(&path, SyncMode::Full).unwrap();
        wal.append(TxId(1), WalType::Insert, b"row-a".to_vec()).unwrap();
        wal.append(TxId(1), WalType::Commit, Vec::new()).unwrap();
        wal.sync_all().unwrap();
        drop(wal);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let (_wal, recovery) = Wal::open(&path, SyncMode::Full).unwrap();
        assert_eq!(recovery.records.len(), 1);
    }

    #[test]
    fn lsns_are_strictly_increasing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");
        let (mut wal, _) = Wal::open(&path, SyncMode::Full).unwrap();
        let a = wal.append(TxId(1), WalType::Insert, vec![]).unwrap();
        let b = wal.append(TxId(1), WalType::Insert, vec![]).unwrap();
        assert!(a < b);
    }
}
