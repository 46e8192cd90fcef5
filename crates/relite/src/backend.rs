//! Backend (§4.7): the blob store the core consumes underneath the meta
//! page. The reference engine keeps paged-storage internals out of the
//! core's scope; this crate only needs the sliver of the contract a meta
//! page validation step exercises — `size`/`read_at`/`write_at`/`sync` —
//! implemented by a file-backed store and an in-memory store.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::StorageError;

const MAGIC: u32 = 0x5245_4c49; // "RELI"
const FORMAT_VERSION: u32 = 1;
const META_PAGE_LEN: usize = 4 + 4 + 4 + 8; // magic, version, page_size, root_page_id

/// A blob store with the operations §4.7 requires of the core's backend
/// collaborator.
pub trait Backend: Send + Sync {
    fn size(&self) -> Result<u64, StorageError>;
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), StorageError>;
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), StorageError>;
    fn sync(&self) -> Result<(), StorageError>;
    fn close(&self) -> Result<(), StorageError>;
}

/// Magic number, format version, page size, and the catalog ordered map's
/// root page id (§4.7). This engine persists the catalog as JSON (§6, §4.9)
/// rather than as a paged B+Tree, so `root_page_id` is a fixed sentinel —
/// the meta page exists to validate the file's identity and page size on
/// open, not to locate live structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaPage {
    pub version: u32,
    pub page_size: u32,
    pub root_page_id: u64,
}

impl MetaPage {
    pub fn new(page_size: u32) -> MetaPage {
        MetaPage { version: FORMAT_VERSION, page_size, root_page_id: 0 }
    }

    fn encode(&self) -> [u8; META_PAGE_LEN] {
        let mut buf = [0u8; META_PAGE_LEN];
        LittleEndian::write_u32(&mut buf[0..4], MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_u32(&mut buf[8..12], self.page_size);
        LittleEndian::write_u64(&mut buf[12..20], self.root_page_id);
        buf
    }

    fn decode(buf: &[u8]) -> Result<MetaPage, StorageError> {
        if buf.len() < META_PAGE_LEN {
            return Err(StorageError::ShortRead { expected: META_PAGE_LEN, found: buf.len() });
        }
        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != MAGIC {
            return Err(StorageError::CorruptMetaPage(format!("bad magic {magic:#x}")));
        }
        Ok(MetaPage {
            version: LittleEndian::read_u32(&buf[4..8]),
            page_size: LittleEndian::read_u32(&buf[8..12]),
            root_page_id: LittleEndian::read_u64(&buf[12..20]),
        })
    }

    /// Writes a fresh meta page to `backend` at offset 0.
    pub fn write(&self, backend: &dyn Backend) -> Result<(), StorageError> {
        backend.write_at(&self.encode(), 0)
    }

    /// Reads and validates the meta page at offset 0. If the backend is
    /// empty (a brand-new file or a fresh in-memory store), writes a
    /// default meta page for `page_size` and returns it.
    pub fn open_or_init(backend: &dyn Backend, page_size: u32) -> Result<MetaPage, StorageError> {
        if backend.size()? < META_PAGE_LEN as u64 {
            let meta = MetaPage::new(page_size);
            meta.write(backend)?;
            return Ok(meta);
        }
        let mut buf = [0u8; META_PAGE_LEN];
        backend.read_at(&mut buf, 0)?;
        MetaPage::decode(&buf)
    }
}

/// File-backed blob store for on-disk databases.
pub struct FileBackend {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<FileBackend, StorageError> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).read(true).write(true).open(&path)?;
        Ok(FileBackend { file: Mutex::new(file), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for FileBackend {
    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.file.lock().unwrap().metadata()?.len())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), StorageError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), StorageError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        self.file.lock().unwrap().sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<(), StorageError> {
        self.sync()
    }
}

/// In-memory blob store for `:memory:` databases and tests.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }
}

impl Backend for MemoryBackend {
    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.data.lock().unwrap().len() as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), StorageError> {
        let data = self.data.lock().unwrap();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(StorageError::ShortRead { expected: buf.len(), found: data.len().saturating_sub(start) });
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_round_trips_meta_page() {
        let backend = MemoryBackend::new();
        let meta = MetaPage::open_or_init(&backend, 4096).unwrap();
        assert_eq!(meta.page_size, 4096);
        let reread = MetaPage::open_or_init(&backend, 4096).unwrap();
        assert_eq!(meta, reread);
    }

    #[test]
    fn rejects_corrupt_magic() {
        let backend = MemoryBackend::new();
        backend.write_at(&[0u8; META_PAGE_LEN], 0).unwrap();
        assert!(MetaPage::open_or_init(&backend, 4096).is_err());
    }

    #[test]
    fn file_backend_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("db.relite");
        {
            let backend = FileBackend::open(&path).unwrap();
            MetaPage::new(8192).write(&backend).unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        let meta = MetaPage::open_or_init(&backend, 4096).unwrap();
        assert_eq!(meta.page_size, 8192);
    }
}
