//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route writes to the WAL and the active memtable
//! - Answer reads from memtables and SSTables, freshest first
//! - Freeze full memtables and hand them to the flush worker
//! - Compact SSTables on demand and when too many accumulate
//! - Replay WAL files left by a crash on startup

mod worker;

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::Result;
use crate::memtable::MemTable;
use crate::merge::{LiveEntries, MergeIterator, Source};
use crate::storage::{SSTable, SSTableBuilder, Snapshot, TableCatalog};
use crate::wal::{self, Operation, WalRecovery, WalWriter};
use crate::LsmError;

use worker::{Job, Worker};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (upsert/put/delete): hold the read side of the memtable lock
///   while applying, so writers on different keys run concurrently. With the
///   WAL enabled, the WAL mutex orders the log append and memtable insert.
/// - **Freeze**: takes the write side of the memtable lock for the pointer
///   swap only; the flush itself happens on the flush worker.
/// - **Reads** (get/range): clone the memtable set, then the catalog
///   snapshot, and never block on flush or compaction.
/// - **Flush / compaction**: one dedicated thread each.
pub struct Engine {
    inner: Arc<Inner>,
    flusher: Worker,
    compactor: Worker,
}

/// State shared between the engine handle and its workers
pub(crate) struct Inner {
    config: Config,
    catalog: TableCatalog,
    memtables: RwLock<MemTables>,
    /// Next memtable generation id (also names its WAL file)
    next_generation: AtomicU64,
    closed: AtomicBool,
    /// Set while a background flush is queued but not yet started
    flush_queued: AtomicBool,
    flush_tx: Sender<Job>,
    compact_tx: Sender<Job>,
}

/// The active memtable plus those waiting for flush
struct MemTables {
    active: Arc<MemTable>,
    /// WAL of the active generation
    wal: Option<Mutex<WalWriter>>,
    /// Frozen memtables, newest first
    frozen: VecDeque<Arc<MemTable>>,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Open the table catalog (manifest + SSTables)
    /// 3. Replay WAL files left by a crash and flush them to an SSTable
    /// 4. Start the flush and compaction workers
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let catalog = TableCatalog::open(&config.data_dir)?;

        let mut wal_ids = Vec::new();
        for entry in fs::read_dir(&config.data_dir)? {
            if let Some(id) = wal::parse_wal_id(&entry?.path()) {
                wal_ids.push(id);
            }
        }
        wal_ids.sort_unstable();
        let generation = wal_ids.last().map_or(1, |id| id + 1);

        let wal = if config.wal_enabled {
            let path = wal::wal_path(&config.data_dir, generation);
            Some(Mutex::new(WalWriter::open(&path, config.wal_sync_strategy)?))
        } else {
            None
        };

        let (flush_tx, flush_rx) = channel::unbounded();
        let (compact_tx, compact_rx) = channel::unbounded();

        let inner = Arc::new(Inner {
            config,
            catalog,
            memtables: RwLock::new(MemTables {
                active: Arc::new(MemTable::new(generation)),
                wal,
                frozen: VecDeque::new(),
            }),
            next_generation: AtomicU64::new(generation + 1),
            closed: AtomicBool::new(false),
            flush_queued: AtomicBool::new(false),
            flush_tx: flush_tx.clone(),
            compact_tx: compact_tx.clone(),
        });

        inner.recover(&wal_ids)?;

        let flusher = Worker::spawn("lsmkv-flush", Arc::clone(&inner), flush_tx, flush_rx)?;
        let compactor =
            Worker::spawn("lsmkv-compact", Arc::clone(&inner), compact_tx, compact_rx)?;

        info!(
            dir = %inner.config.data_dir.display(),
            sstables = inner.catalog.sstable_count(),
            "engine opened"
        );

        Ok(Self {
            inner,
            flusher,
            compactor,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active memtable
    /// 2. Frozen memtables (newest to oldest)
    /// 3. SSTables (newest to oldest)
    ///
    /// The first entry found decides; a tombstone reads as `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.inner.ensure_open()?;
        let (memtables, snapshot) = self.inner.view();

        for memtable in &memtables {
            if let Some(entry) = memtable.get(key) {
                return Ok(entry.value);
            }
        }

        for table in snapshot.tables() {
            if !table.might_contain(key) {
                continue;
            }
            if let Some(entry) = table.get(key) {
                return Ok(entry.value);
            }
        }

        Ok(None)
    }

    /// Live entries with keys in `[from, to)`, ascending
    ///
    /// The iterator holds its own references to every memtable and SSTable it
    /// reads, so it stays valid across flushes and compactions.
    pub fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<LiveEntries> {
        self.inner.ensure_open()?;
        let (memtables, snapshot) = self.inner.view();

        let sources = memtables
            .iter()
            .map(|m| Source::from(m.range(from, to)))
            .chain(snapshot.tables().iter().map(|t| Source::from(t.iter(from, to))));

        Ok(MergeIterator::new(sources).live())
    }

    /// Insert or replace an entry (a tombstone entry deletes the key)
    ///
    /// Fails with `Overloaded`, without applying the write, when the active
    /// memtable is full and the flush queue has no room.
    pub fn upsert(&self, entry: Entry) -> Result<()> {
        self.inner.upsert(entry)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(Entry::put(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        ))
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.upsert(Entry::tombstone(Bytes::copy_from_slice(key)))
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size and returns once every
    /// memtable frozen so far is durable in an SSTable.
    pub fn flush(&self) -> Result<()> {
        self.inner.ensure_open()?;

        match self.inner.freeze(true) {
            Ok(_) => {}
            Err(LsmError::Overloaded) => {
                Job::run(&self.inner.flush_tx, |tx| Job::Flush(Some(tx)))?;
                self.inner.freeze(true)?;
            }
            Err(e) => return Err(e),
        }

        Job::run(&self.inner.flush_tx, |tx| Job::Flush(Some(tx)))
    }

    /// Merge every SSTable into one (public API)
    ///
    /// Runs on the compaction worker; returns once the new table is live.
    pub fn compact(&self) -> Result<()> {
        self.inner.ensure_open()?;
        Job::run(&self.inner.compact_tx, |tx| Job::Compact(Some(tx)))
    }

    /// Close the engine gracefully
    ///
    /// Stops the workers, then flushes the active memtable and everything
    /// still queued, so no WAL replay is needed on the next open.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.flusher.stop();
        self.compactor.stop();

        self.inner.flush_frozen()?;
        if self.inner.freeze(true)? {
            self.inner.flush_frozen()?;
        }
        self.inner.retire_active_wal()?;

        info!(dir = %self.inner.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the current size of the active memtable
    pub fn memtable_size(&self) -> u64 {
        self.inner.memtables.read().active.size_bytes()
    }

    /// Number of frozen memtables waiting for the flush worker
    pub fn pending_flushes(&self) -> usize {
        self.inner.memtables.read().frozen.len()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.inner.catalog.sstable_count()
    }

    /// The live SSTables, newest first
    pub fn tables(&self) -> Arc<Snapshot> {
        self.inner.catalog.snapshot()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "engine shutdown failed");
        }
    }
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LsmError::Closed);
        }
        Ok(())
    }

    /// Memtables freshest first, then the catalog snapshot
    ///
    /// The memtables must be read before the snapshot: a flush publishes its
    /// table before dropping the frozen memtable, so this order always sees
    /// the data in at least one of the two.
    fn view(&self) -> (Vec<Arc<MemTable>>, Arc<Snapshot>) {
        let memtables: Vec<Arc<MemTable>> = {
            let tables = self.memtables.read();
            std::iter::once(&tables.active)
                .chain(tables.frozen.iter())
                .cloned()
                .collect()
        };
        (memtables, self.catalog.snapshot())
    }

    fn wal_path(&self, generation: u64) -> PathBuf {
        wal::wal_path(&self.config.data_dir, generation)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    fn upsert(&self, entry: Entry) -> Result<()> {
        self.ensure_open()?;
        let threshold = self.config.flush_threshold_bytes;

        let size = {
            let tables = self.memtables.read();
            if tables.active.size_bytes() >= threshold
                && tables.frozen.len() >= self.config.max_pending_flushes
            {
                // Keep the flush worker busy; a failed flush is only retried
                // when something asks again
                self.request_flush();
                return Err(LsmError::Overloaded);
            }

            match &tables.wal {
                Some(wal) => {
                    let mut wal = wal.lock();
                    wal.append(&Operation::from(&entry))?;
                    tables.active.upsert(entry)
                }
                None => tables.active.upsert(entry),
            }
        };

        if size >= threshold {
            match self.freeze(false) {
                Ok(true) => self.request_flush(),
                Ok(false) => {}
                Err(LsmError::Overloaded) => {
                    debug!(size, "flush queue full, freeze deferred");
                }
                Err(e) => error!(error = %e, "failed to freeze memtable"),
            }
        }

        Ok(())
    }

    /// Swap a fresh memtable (and WAL) in for the active one
    ///
    /// Without `force`, only freezes if the active memtable is still over
    /// the threshold (another writer may have frozen it already). Returns
    /// whether a memtable was frozen.
    fn freeze(&self, force: bool) -> Result<bool> {
        let mut tables = self.memtables.write();

        if tables.active.is_empty() {
            return Ok(false);
        }
        if !force && tables.active.size_bytes() < self.config.flush_threshold_bytes {
            return Ok(false);
        }
        if tables.frozen.len() >= self.config.max_pending_flushes {
            return Err(LsmError::Overloaded);
        }

        if let Some(wal) = &tables.wal {
            wal.lock().sync()?;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let wal = if self.config.wal_enabled {
            Some(Mutex::new(WalWriter::open(
                &self.wal_path(generation),
                self.config.wal_sync_strategy,
            )?))
        } else {
            None
        };

        tables.wal = wal;
        let frozen = std::mem::replace(&mut tables.active, Arc::new(MemTable::new(generation)));
        debug!(
            generation = frozen.id(),
            bytes = frozen.size_bytes(),
            entries = frozen.len(),
            "froze memtable"
        );
        tables.frozen.push_front(frozen);

        Ok(true)
    }

    /// Queue a background flush unless one is already waiting
    fn request_flush(&self) {
        if !self.flush_queued.swap(true, Ordering::SeqCst) {
            let _ = self.flush_tx.send(Job::Flush(None));
        }
    }

    /// Drop the WAL of an empty active memtable (on close)
    fn retire_active_wal(&self) -> Result<()> {
        let mut tables = self.memtables.write();
        if !tables.active.is_empty() {
            return Ok(());
        }
        if tables.wal.take().is_some() {
            self.remove_wal(tables.active.id());
        }
        Ok(())
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Flush every frozen memtable, oldest first; returns how many
    ///
    /// A failed memtable stays queued so the next attempt retries it.
    pub(crate) fn flush_frozen(&self) -> Result<usize> {
        self.flush_queued.store(false, Ordering::SeqCst);
        let mut flushed = 0;

        loop {
            let oldest = self.memtables.read().frozen.back().cloned();
            let Some(memtable) = oldest else {
                break;
            };

            self.write_memtable(&memtable)?;

            {
                let mut tables = self.memtables.write();
                if tables
                    .frozen
                    .back()
                    .is_some_and(|m| Arc::ptr_eq(m, &memtable))
                {
                    tables.frozen.pop_back();
                }
            }
            self.remove_wal(memtable.id());
            flushed += 1;
        }

        if flushed > 0 && self.needs_compaction() {
            let _ = self.compact_tx.send(Job::Compact(None));
        }

        // A freeze may have been deferred while the queue was full
        if !self.closed.load(Ordering::SeqCst) {
            if let Ok(true) = self.freeze(false) {
                self.request_flush();
            }
        }

        Ok(flushed)
    }

    /// Write one memtable to a new SSTable and register it
    fn write_memtable(&self, memtable: &Arc<MemTable>) -> Result<()> {
        if memtable.is_empty() {
            return Ok(());
        }

        let (id, path) = self.catalog.allocate();
        let result = SSTableBuilder::write(&path, memtable.iter())
            .and_then(|info| SSTable::open(&info.path))
            .and_then(|table| self.catalog.add(table));

        match result {
            Ok(table) => {
                info!(
                    generation = memtable.id(),
                    sstable = id,
                    entries = table.len(),
                    bytes = table.file_size(),
                    "flushed memtable"
                );
                Ok(())
            }
            Err(e) => {
                discard_file(&path);
                Err(e)
            }
        }
    }

    fn remove_wal(&self, generation: u64) {
        if !self.config.wal_enabled {
            return;
        }
        let path = self.wal_path(generation);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove WAL"),
        }
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    pub(crate) fn needs_compaction(&self) -> bool {
        let trigger = self.config.compaction_trigger;
        trigger > 0 && self.catalog.sstable_count() >= trigger
    }

    /// Merge every live SSTable into one
    pub(crate) fn compact(&self) -> Result<()> {
        let snapshot = self.catalog.snapshot();
        if snapshot.is_empty() {
            return Ok(());
        }
        self.compact_tables(snapshot.tables())
    }

    /// Merge `inputs` (a contiguous run of the catalog, newest first) into
    /// one table
    ///
    /// Tombstones are dropped only when the inputs reach the oldest live
    /// table: nothing older is left for them to shadow.
    fn compact_tables(&self, inputs: &[Arc<SSTable>]) -> Result<()> {
        let snapshot = self.catalog.snapshot();
        let drop_tombstones = match (inputs.last(), snapshot.tables().last()) {
            (Some(input), Some(oldest)) => Arc::ptr_eq(input, oldest),
            _ => false,
        };

        let merged = MergeIterator::new(inputs.iter().map(|t| Source::from(t.iter(None, None))));

        let (id, path) = self.catalog.allocate();
        let mut builder = SSTableBuilder::new(&path)?;
        for entry in merged {
            match &entry.value {
                Some(value) => builder.add(&entry.key, value)?,
                None if drop_tombstones => continue,
                None => builder.add_tombstone(&entry.key)?,
            }
        }

        let output = if builder.entry_count() == 0 {
            drop(builder);
            None
        } else {
            let info = builder.finish()?;
            match SSTable::open(&info.path) {
                Ok(table) => Some(table),
                Err(e) => {
                    discard_file(&path);
                    return Err(e);
                }
            }
        };
        let produced = output.is_some();

        match self.catalog.replace(inputs, output) {
            Ok(table) => {
                info!(
                    inputs = inputs.len(),
                    sstable = ?table.as_ref().map(|t| t.id()),
                    entries = table.as_ref().map_or(0, |t| t.len()),
                    drop_tombstones,
                    "compaction finished"
                );
                Ok(())
            }
            Err(e) => {
                if produced {
                    discard_file(&path);
                }
                warn!(sstable = id, error = %e, "compaction aborted");
                Err(e)
            }
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Replay WAL files from an unclean shutdown, oldest generation first,
    /// flush them to one SSTable and delete them
    fn recover(&self, wal_ids: &[u64]) -> Result<()> {
        if wal_ids.is_empty() {
            return Ok(());
        }

        let recovered = Arc::new(MemTable::new(0));
        for &generation in wal_ids {
            let path = self.wal_path(generation);
            let (entries, result) = WalRecovery::recover(&path)?;

            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                info!(
                    path = %path.display(),
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    "WAL recovery"
                );
            }

            for entry in entries {
                recovered.upsert(entry.operation.into_entry());
            }
        }

        if !recovered.is_empty() {
            info!(entries = recovered.len(), "flushing recovered entries to SSTable");
            self.write_memtable(&recovered)?;
        }

        for &generation in wal_ids {
            let path = self.wal_path(generation);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }
}

/// Best-effort removal of an output file that was never published
fn discard_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove unpublished sstable");
        }
    }
}
