//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (24 bytes)                                       │
//! │   Magic: "LSKV" (4) | Version: u16 (2) | Reserved (2)   │
//! │   IndexLen: u64 (8) | CRC32: u32 (4)   | Reserved (4)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Region (variable)                                  │
//! │   [Key0][Value0][Key1][Value1] ...                      │
//! │   (tombstones carry no value bytes)                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Region (IndexLen = N * 16 bytes)                  │
//! │   [KeyOffset: u64][ValueOffset: u64]                    │
//! │   ... one record per entry, ascending by key ...        │
//! │   (bit 63 of ValueOffset set = tombstone)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Offsets are relative to the start of the data region. A key ends where its
//! value starts; a value ends where the next key starts (or at the end of the
//! data region). The entry count is `IndexLen / 16`; no other count is stored.
//! The CRC covers the data region followed by the index region.

mod builder;
mod iterator;
mod reader;

use std::path::{Path, PathBuf};

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTable;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying an lsmkv SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"LSKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Reserved (2) + IndexLen (8) + CRC (4) + Reserved (4)
pub(crate) const HEADER_SIZE: usize = 24;

/// Index record size: KeyOffset (8) + ValueOffset (8)
pub(crate) const INDEX_RECORD_SIZE: usize = 16;

/// Bit 63 of a value offset marks a tombstone
pub(crate) const TOMBSTONE_BIT: u64 = 1 << 63;

/// Extension of published SSTable files
pub const SSTABLE_EXTENSION: &str = "sst";

// =============================================================================
// Naming
// =============================================================================

/// "000042.sst" for id 42
pub fn table_file_name(id: u64) -> String {
    format!("{:06}.{}", id, SSTABLE_EXTENSION)
}

/// "000042.sst" → Some(42)
pub fn parse_table_id(path: &Path) -> Option<u64> {
    if path.extension()? != SSTABLE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

pub(crate) fn read_u64(buf: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_le_bytes(bytes)
}

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Metadata returned by [`SSTableBuilder::finish`]
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable (tombstones included)
    pub entry_count: u64,
    /// Smallest key (empty for an empty table)
    pub min_key: Vec<u8>,
    /// Largest key (empty for an empty table)
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
}

impl TableInfo {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }
}
