//! Storage Module
//!
//! Persistent storage layer: SSTables and the catalog that tracks them.
//!
//! ## Responsibilities
//! - Persist sorted runs to disk (`SSTableBuilder`)
//! - Point lookups and range scans over memory-mapped files (`SSTable`)
//! - Durable list of live tables (`Manifest`)
//! - Versioned snapshots of the live tables (`TableCatalog`)
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── MANIFEST        live table files, oldest first
//!   ├── MANIFEST.tmp    rewrite in progress (renamed over MANIFEST)
//!   ├── 000001.sst
//!   └── 000004.sst
//! ```

mod catalog;
mod manifest;
pub mod sstable;

use std::fs::File;
use std::io;
use std::path::Path;

pub use catalog::{Snapshot, TableCatalog};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, TableInfo};

/// Make renames inside `dir` durable
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
