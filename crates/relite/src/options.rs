//! `OpenOptions`/`DbOptions` (§4.8): a plain builder struct mirroring the
//! reference codebase's `commitlog::OpenOptions` / durability-config
//! pattern. Parsing of external configuration sources (flags, env vars,
//! config files) is out of scope per §1 — this is the in-process struct
//! those outer layers would populate.

pub use relite_wal::SyncMode;

/// Options accepted by [`crate::Db::open`].
#[derive(Clone, Debug)]
pub struct DbOptions {
    /// Page size used by the file backend (§4.7). Advisory at this layer —
    /// the backend's meta page records it for validation on reopen.
    pub page_size: u32,
    /// Advisory cache size hint; the in-memory map has no page cache of its
    /// own, so this is plumbed through for API compatibility.
    pub cache_size: u32,
    /// Forces the in-memory backend even if `path` isn't `:memory:`.
    pub in_memory: bool,
    pub wal_enabled: bool,
    pub sync_mode: SyncMode,
    /// B+Tree branching factor for every table and secondary index's
    /// ordered map (§4.1).
    pub branching_factor: usize,
}

impl Default for DbOptions {
    fn default() -> DbOptions {
        DbOptions {
            page_size: 4096,
            cache_size: 2000,
            in_memory: false,
            wal_enabled: true,
            sync_mode: SyncMode::Full,
            branching_factor: relite_ordmap::DEFAULT_BRANCHING_FACTOR,
        }
    }
}

impl DbOptions {
    pub fn new() -> DbOptions {
        DbOptions::default()
    }

    pub fn in_memory(mut self, yes: bool) -> DbOptions {
        self.in_memory = yes;
        self
    }

    pub fn wal_enabled(mut self, yes: bool) -> DbOptions {
        self.wal_enabled = yes;
        self
    }

    pub fn sync_mode(mut self, mode: SyncMode) -> DbOptions {
        self.sync_mode = mode;
        self
    }

    pub fn branching_factor(mut self, factor: usize) -> DbOptions {
        self.branching_factor = factor;
        self
    }
}
