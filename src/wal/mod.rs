//! Write-Ahead Log (WAL) Module
//!
//! Provides durability for writes that have not been flushed yet.
//!
//! ## Responsibilities
//! - Append log entries before the memtable is mutated
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay
//!
//! Each memtable generation writes its own file (`wal_NNNNNN.log`); the file
//! is deleted once that memtable is durable in an SSTable.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! Data is the bincode-encoded `Operation`; the CRC covers LSN and Data.

mod entry;
mod reader;
mod recovery;
mod writer;

use std::path::{Path, PathBuf};

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;

/// "wal_000007.log" for generation 7
pub fn wal_file_name(id: u64) -> String {
    format!("wal_{:06}.log", id)
}

pub fn wal_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(wal_file_name(id))
}

/// "wal_000007.log" → Some(7)
pub fn parse_wal_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("wal_")?.strip_suffix(".log")?.parse().ok()
}
