//! Table Catalog
//!
//! Tracks the live SSTables of a store directory.
//!
//! ## Responsibilities
//! - Rebuild the live table list from the manifest on startup
//! - Remove files the manifest does not reference (crash leftovers)
//! - Publish immutable, versioned snapshots of the live tables
//! - Add a flushed table / replace compacted tables with one manifest rename

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::LsmError;

use super::manifest::Manifest;
use super::sstable::{parse_table_id, table_file_name, SSTable};

/// One consistent view of the live SSTables, newest first
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    tables: Vec<Arc<SSTable>>,
}

impl Snapshot {
    /// Incremented by every catalog change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Live tables, newest first
    pub fn tables(&self) -> &[Arc<SSTable>] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// File names in manifest order (oldest first)
    fn file_names(&self) -> Vec<String> {
        self.tables.iter().rev().map(|t| t.file_name()).collect()
    }
}

/// Manages the set of live SSTables
///
/// ## Concurrency:
/// - `current`: readers clone the `Arc<Snapshot>` and never block writers
///   for longer than the pointer swap
/// - `manifest`: held for the whole of every add/replace, so manifest
///   rewrites and snapshot publication happen in one global order
/// - `next_table_id`: atomic counter (lock-free)
pub struct TableCatalog {
    /// Directory where SSTables are stored
    dir: PathBuf,

    /// Serializes manifest mutation
    manifest: Mutex<Manifest>,

    /// Current snapshot, swapped wholesale on every change
    current: RwLock<Arc<Snapshot>>,

    /// Next ID for creating new SSTables
    next_table_id: AtomicU64,
}

impl TableCatalog {
    /// Open or create the catalog in the given directory
    ///
    /// On startup:
    /// 1. Read the manifest. If it is absent the directory must hold no
    ///    tables; an empty manifest is then written
    /// 2. Open every listed table; a missing or invalid file is fatal
    /// 3. Delete unlisted `.sst` files and leftover temp files
    /// 4. Continue table ids after the largest one seen
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let manifest = Manifest::new(dir);
        let names = manifest.load()?;
        if !manifest.exists() {
            if let Some(orphan) = find_table_file(dir)? {
                return Err(LsmError::Corruption(format!(
                    "{} is missing but sstable {} exists",
                    manifest.path().display(),
                    orphan.display()
                )));
            }
            manifest.write(&[])?;
        }
        if manifest.remove_stale_tmp()? {
            warn!(dir = %dir.display(), "removed leftover MANIFEST.tmp");
        }

        let mut max_id = 0u64;
        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(LsmError::Corruption(format!(
                    "manifest references missing sstable {}",
                    path.display()
                )));
            }
            let table = SSTable::open(&path)?;
            max_id = max_id.max(table.id());
            tables.push(Arc::new(table));
        }
        // Manifest is oldest first; snapshots are newest first
        tables.reverse();

        let listed: HashSet<&str> = names.iter().map(String::as_str).collect();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            if name.ends_with(".sst.tmp") {
                warn!(path = %path.display(), "removing incomplete sstable");
                fs::remove_file(&path)?;
            } else if let Some(id) = parse_table_id(&path) {
                max_id = max_id.max(id);
                if !listed.contains(name.as_str()) {
                    warn!(path = %path.display(), "removing sstable not referenced by manifest");
                    fs::remove_file(&path)?;
                }
            }
        }

        info!(
            dir = %dir.display(),
            tables = tables.len(),
            next_table_id = max_id + 1,
            "opened table catalog"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest: Mutex::new(manifest),
            current: RwLock::new(Arc::new(Snapshot { version: 0, tables })),
            next_table_id: AtomicU64::new(max_id + 1),
        })
    }

    /// The current set of live tables
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Reserve an id and path for a new table
    pub fn allocate(&self) -> (u64, PathBuf) {
        let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        (id, self.dir.join(table_file_name(id)))
    }

    /// Register a freshly written table as the newest one
    pub fn add(&self, table: SSTable) -> Result<Arc<SSTable>> {
        let manifest = self.manifest.lock();
        let current = self.snapshot();

        let table = Arc::new(table);
        let mut tables = Vec::with_capacity(current.len() + 1);
        tables.push(Arc::clone(&table));
        tables.extend(current.tables.iter().cloned());

        let next = Snapshot {
            version: current.version + 1,
            tables,
        };
        manifest.rewrite(&next.file_names())?;
        *self.current.write() = Arc::new(next);
        sync_manifest(&manifest);

        debug!(table = %table.file_name(), entries = table.len(), "added sstable to catalog");
        Ok(table)
    }

    /// Replace `inputs` with `output` (or with nothing)
    ///
    /// `inputs` must be live and contiguous in the current snapshot; `output`
    /// takes their place, so tables added after the inputs stay newer. The
    /// inputs are marked stale and their files go away with their last reader.
    pub fn replace(
        &self,
        inputs: &[Arc<SSTable>],
        output: Option<SSTable>,
    ) -> Result<Option<Arc<SSTable>>> {
        if inputs.is_empty() {
            return Err(LsmError::Storage("replace called without inputs".to_string()));
        }

        let manifest = self.manifest.lock();
        let current = self.snapshot();

        let mut positions = Vec::with_capacity(inputs.len());
        for input in inputs {
            match current.tables.iter().position(|t| Arc::ptr_eq(t, input)) {
                Some(pos) => positions.push(pos),
                None => {
                    return Err(LsmError::Storage(format!(
                        "sstable {} is no longer live",
                        input.file_name()
                    )))
                }
            }
        }
        positions.sort_unstable();
        let (first, last) = (positions[0], positions[positions.len() - 1]);
        if last - first + 1 != positions.len() {
            return Err(LsmError::Storage(
                "compaction inputs must be contiguous".to_string(),
            ));
        }

        let output = output.map(Arc::new);
        let mut tables = Vec::with_capacity(current.len() - inputs.len() + 1);
        tables.extend(current.tables[..first].iter().cloned());
        tables.extend(output.iter().cloned());
        tables.extend(current.tables[last + 1..].iter().cloned());

        let next = Snapshot {
            version: current.version + 1,
            tables,
        };
        manifest.rewrite(&next.file_names())?;
        *self.current.write() = Arc::new(next);
        sync_manifest(&manifest);
        drop(manifest);

        let output_id = output.as_ref().map(|t| t.id());
        for input in inputs {
            input.mark_compacted(output_id);
        }

        info!(
            inputs = inputs.len(),
            output = ?output.as_ref().map(|t| t.file_name()),
            "replaced sstables in catalog"
        );
        Ok(output)
    }

    /// Get the number of live SSTables
    pub fn sstable_count(&self) -> usize {
        self.current.read().len()
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_table_id(&self) -> u64 {
        self.next_table_id.load(Ordering::SeqCst)
    }
}

/// First `NNNNNN.sst` file in `dir`, if any
fn find_table_file(dir: &Path) -> Result<Option<PathBuf>> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && parse_table_id(&path).is_some() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Sync the directory after a manifest rename
///
/// The rename already made the new list current and the snapshot is
/// published, so a failure here must not be reported as an unpublished table.
fn sync_manifest(manifest: &Manifest) {
    if let Err(e) = manifest.sync() {
        warn!(path = %manifest.path().display(), error = %e, "failed to sync directory after manifest rename");
    }
}
