//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::LsmError;

use super::entry::compute_crc;
use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next record
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file, `WalCorruption` for a torn
    /// or damaged record.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Err(LsmError::WalCorruption(format!(
                "truncated record header at offset {}",
                self.position
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&header[0..8]);
        let lsn = u64::from_le_bytes(lsn);
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as u64;

        if remaining - (HEADER_SIZE as u64) < len {
            return Err(LsmError::WalCorruption(format!(
                "truncated record payload at offset {}",
                self.position
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload)?;

        if compute_crc(lsn, &payload) != crc {
            return Err(LsmError::WalCorruption(format!(
                "checksum mismatch at offset {}",
                self.position
            )));
        }

        let entry = WalEntry::decode(lsn, &payload).map_err(|e| {
            LsmError::WalCorruption(format!("undecodable record at offset {}: {}", self.position, e))
        })?;
        self.position += HEADER_SIZE as u64 + len;

        Ok(Some(entry))
    }

    /// Offset just past the last record read successfully
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            failed: false,
        }
    }
}

/// Iterator over WAL entries; ends after the first error
pub struct WalIterator {
    reader: WalReader,
    failed: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
