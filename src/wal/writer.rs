//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::entry::encode_record;
use super::Operation;

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries handed to the OS since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: 1,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append an operation, returning its LSN
    ///
    /// The record always reaches the OS before this returns; fsync follows
    /// the configured strategy.
    pub fn append(&mut self, operation: &Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = encode_record(lsn, operation)?;

        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        self.next_lsn += 1;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN of the last appended entry (0 if none)
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
