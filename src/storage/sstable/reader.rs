//! SSTable Reader
//!
//! Memory-maps an SSTable file and answers lookups by binary search over the
//! fixed-width index.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use memmap2::Mmap;
use tracing::{debug, info, warn};

use crate::comparator::compare;
use crate::entry::Entry;
use crate::error::Result;
use crate::LsmError;

use super::iterator::SSTableIterator;
use super::{
    parse_table_id, read_u64, HEADER_SIZE, INDEX_RECORD_SIZE, MAGIC, TOMBSTONE_BIT, VERSION,
};

/// An open, immutable SSTable
///
/// Every slice handed out borrows `&self`, so none can outlive the mapping.
/// Readers share a table through `Arc<SSTable>`; once a compaction marks the
/// table stale, the file is unlinked when the last `Arc` is dropped.
pub struct SSTable {
    id: u64,
    path: PathBuf,
    mmap: Mmap,
    /// Absolute offset where the index region begins (= end of data region)
    data_end: usize,
    /// Number of index records
    len: usize,
    has_tombstones: bool,
    /// Set once a compaction has retired this table; holds the replacement
    /// table id, or `None` when nothing survived the compaction
    compacted_to: OnceLock<Option<u64>>,
}

impl SSTable {
    /// Open and validate an SSTable
    ///
    /// Any structural problem is reported as `LsmError::Corruption`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: SSTable files are never modified after the builder renames
        // them into place, and every access below is bounds-checked.
        let mmap = unsafe { Mmap::map(&file)? };

        let corrupt = |msg: String| LsmError::Corruption(format!("{}: {}", path.display(), msg));

        if mmap.len() < HEADER_SIZE {
            return Err(corrupt(format!("file too small ({} bytes)", mmap.len())));
        }
        if &mmap[0..4] != MAGIC {
            return Err(corrupt(format!("invalid magic {:?}", &mmap[0..4])));
        }
        let version = u16::from_le_bytes([mmap[4], mmap[5]]);
        if version != VERSION {
            return Err(corrupt(format!("unsupported version {}", version)));
        }

        let index_len = read_u64(&mmap, 8);
        let checksum = u32::from_le_bytes([mmap[16], mmap[17], mmap[18], mmap[19]]);
        let body_len = (mmap.len() - HEADER_SIZE) as u64;

        if index_len % INDEX_RECORD_SIZE as u64 != 0 {
            return Err(corrupt(format!(
                "index length {} is not a multiple of {}",
                index_len, INDEX_RECORD_SIZE
            )));
        }
        if index_len > body_len {
            return Err(corrupt(format!(
                "index length {} exceeds file body of {} bytes",
                index_len, body_len
            )));
        }
        if crc32fast::hash(&mmap[HEADER_SIZE..]) != checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let data_end = mmap.len() - index_len as usize;
        let len = index_len as usize / INDEX_RECORD_SIZE;

        let mut table = Self {
            id: parse_table_id(path).unwrap_or(0),
            path: path.to_path_buf(),
            mmap,
            data_end,
            len,
            has_tombstones: false,
            compacted_to: OnceLock::new(),
        };
        table.has_tombstones = table.validate_index().map_err(corrupt)?;

        debug!(
            path = %table.path.display(),
            entries = table.len,
            bytes = table.file_size(),
            "opened sstable"
        );
        Ok(table)
    }

    /// Check offsets are in bounds and keys strictly ascending.
    /// Returns whether any record is a tombstone.
    fn validate_index(&self) -> std::result::Result<bool, String> {
        let data_len = (self.data_end - HEADER_SIZE) as u64;
        let mut tombstones = false;
        let mut prev_end = 0u64;

        for i in 0..self.len {
            let (key_offset, raw_value) = self.record(i);
            let value_offset = raw_value & !TOMBSTONE_BIT;
            tombstones |= raw_value & TOMBSTONE_BIT != 0;

            if key_offset < prev_end || key_offset > value_offset || value_offset > data_len {
                return Err(format!("record {} has invalid offsets", i));
            }
            prev_end = value_offset;

            if i > 0 && compare(self.key_at(i - 1), self.key_at(i)) != Ordering::Less {
                return Err(format!("record {} is out of order", i));
            }
        }
        Ok(tombstones)
    }

    // =========================================================================
    // Record Access
    // =========================================================================

    /// Raw index record `i`: (key offset, value offset with tombstone bit)
    fn record(&self, i: usize) -> (u64, u64) {
        let pos = self.data_end + i * INDEX_RECORD_SIZE;
        (read_u64(&self.mmap, pos), read_u64(&self.mmap, pos + 8))
    }

    fn data(&self) -> &[u8] {
        &self.mmap[HEADER_SIZE..self.data_end]
    }

    pub(super) fn key_at(&self, i: usize) -> &[u8] {
        let (key_offset, raw_value) = self.record(i);
        let value_offset = raw_value & !TOMBSTONE_BIT;
        &self.data()[key_offset as usize..value_offset as usize]
    }

    pub(super) fn value_at(&self, i: usize) -> Option<&[u8]> {
        let (_, raw_value) = self.record(i);
        if raw_value & TOMBSTONE_BIT != 0 {
            return None;
        }
        let end = if i + 1 < self.len {
            self.record(i + 1).0 as usize
        } else {
            self.data().len()
        };
        Some(&self.data()[raw_value as usize..end])
    }

    pub(super) fn entry_at(&self, i: usize) -> Entry {
        Entry {
            key: Bytes::copy_from_slice(self.key_at(i)),
            value: self.value_at(i).map(Bytes::copy_from_slice),
        }
    }

    /// Position of the first key `>= key`: 0 below every key, `len()` above
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if compare(self.key_at(mid), key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Point lookup
    ///
    /// Returns:
    /// - `Some(entry)` with a value: key written in this table
    /// - `Some(entry)` without a value: key deleted in this table
    /// - `None`: key not in this table
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let i = self.lower_bound(key);
        if i < self.len && self.key_at(i) == key {
            Some(self.entry_at(i))
        } else {
            None
        }
    }

    /// Iterate over `[from, to)`; `None` leaves that side open
    pub fn iter(self: &Arc<Self>, from: Option<&[u8]>, to: Option<&[u8]>) -> SSTableIterator {
        let start = from.map_or(0, |k| self.lower_bound(k));
        let end = to.map_or(self.len, |k| self.lower_bound(k));
        SSTableIterator::new(Arc::clone(self), start, end.max(start))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Number of entries, tombstones included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn has_tombstones(&self) -> bool {
        self.has_tombstones
    }

    /// Smallest key, `None` for an empty table
    pub fn first_key(&self) -> Option<&[u8]> {
        (self.len > 0).then(|| self.key_at(0))
    }

    /// Largest key, `None` for an empty table
    pub fn last_key(&self) -> Option<&[u8]> {
        (self.len > 0).then(|| self.key_at(self.len - 1))
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [first_key, last_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.first_key(), self.last_key()) {
            (Some(min), Some(max)) => {
                compare(key, min) != Ordering::Less && compare(key, max) != Ordering::Greater
            }
            _ => false,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Mark this table as retired by a compaction into table `into`; the file
    /// is removed once the last reference is dropped
    pub fn mark_compacted(&self, into: Option<u64>) {
        let _ = self.compacted_to.set(into);
    }

    pub fn is_stale(&self) -> bool {
        self.compacted_to.get().is_some()
    }

    /// Id of the table that replaced this one
    pub fn compacted_to(&self) -> Option<u64> {
        self.compacted_to.get().copied().flatten()
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if let Some(into) = self.compacted_to.get() {
            match fs::remove_file(&self.path) {
                Ok(()) => info!(
                    path = %self.path.display(),
                    compacted_to = ?into,
                    "deleted compacted sstable"
                ),
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to delete compacted sstable"
                ),
            }
        }
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("len", &self.len)
            .field("compacted_to", &self.compacted_to())
            .finish()
    }
}
