//! SSTable Builder
//!
//! Writes sorted entries to a new SSTable file.

use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::comparator::compare;
use crate::entry::Entry;
use crate::error::Result;
use crate::storage::sync_dir;
use crate::LsmError;

use super::{TableInfo, HEADER_SIZE, INDEX_RECORD_SIZE, MAGIC, TOMBSTONE_BIT, VERSION};

/// Builder for creating new SSTables from sorted entries
///
/// Everything is written to `<path>.tmp`; `finish()` renames it onto `path`
/// once the file is complete and synced. A builder dropped before `finish()`
/// removes its temp file.
pub struct SSTableBuilder {
    /// Final file path
    path: PathBuf,
    /// Temp file path written until finish
    tmp_path: PathBuf,
    /// Buffered writer for performance
    writer: Option<BufWriter<File>>,
    /// Index records: (key offset, value offset | tombstone bit)
    index: Vec<(u64, u64)>,
    /// Bytes written to the data region so far
    data_len: u64,
    /// Track min/max keys for metadata and ordering checks
    min_key: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    /// Running CRC over data then index
    hasher: crc32fast::Hasher,
    finished: bool,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes a placeholder header immediately; call `add()`/`add_tombstone()`
    /// in strictly ascending key order, then `finish()`.
    pub fn new(path: &Path) -> Result<Self> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: Some(writer),
            index: Vec::new(),
            data_len: 0,
            min_key: None,
            last_key: None,
            hasher: crc32fast::Hasher::new(),
            finished: false,
        })
    }

    /// Build a complete SSTable from entries already in ascending key order
    pub fn write<I>(path: &Path, entries: I) -> Result<TableInfo>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut builder = Self::new(path)?;
        for entry in entries {
            match &entry.value {
                Some(value) => builder.add(&entry.key, value)?,
                None => builder.add_tombstone(&entry.key)?,
            }
        }
        builder.finish()
    }

    /// Add a key-value pair (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None)
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Internal: write an entry (value=None means tombstone)
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some(last) = &self.last_key {
            if compare(last, key) != Ordering::Less {
                return Err(LsmError::Storage(format!(
                    "SSTable keys must be strictly ascending: {:?} after {:?}",
                    key, last
                )));
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LsmError::Storage("SSTable builder already finished".to_string()))?;

        let key_offset = self.data_len;
        writer.write_all(key)?;
        self.hasher.update(key);
        self.data_len += key.len() as u64;

        let mut value_offset = self.data_len;
        match value {
            Some(v) => {
                writer.write_all(v)?;
                self.hasher.update(v);
                self.data_len += v.len() as u64;
            }
            None => value_offset |= TOMBSTONE_BIT,
        }

        if self.data_len & TOMBSTONE_BIT != 0 {
            return Err(LsmError::Storage("SSTable data region too large".to_string()));
        }

        self.index.push((key_offset, value_offset));
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.last_key = Some(key.to_vec());

        Ok(())
    }

    /// Finish building: append the index, backfill the header, sync and
    /// rename the temp file into place
    pub fn finish(mut self) -> Result<TableInfo> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| LsmError::Storage("SSTable builder already finished".to_string()))?;

        let mut index_bytes = Vec::with_capacity(self.index.len() * INDEX_RECORD_SIZE);
        for (key_offset, value_offset) in &self.index {
            index_bytes.extend_from_slice(&key_offset.to_le_bytes());
            index_bytes.extend_from_slice(&value_offset.to_le_bytes());
        }
        writer.write_all(&index_bytes)?;
        self.hasher.update(&index_bytes);

        let checksum = std::mem::take(&mut self.hasher).finalize();
        let index_len = index_bytes.len() as u64;

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        header[8..16].copy_from_slice(&index_len.to_le_bytes());
        header[16..20].copy_from_slice(&checksum.to_le_bytes());

        writer.flush()?;
        let mut file = writer
            .into_inner()
            .map_err(|e| LsmError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir)?;
        }
        self.finished = true;

        Ok(TableInfo {
            path: self.path.clone(),
            entry_count: self.index.len() as u64,
            min_key: self.min_key.take().unwrap_or_default(),
            max_key: self.last_key.take().unwrap_or_default(),
            file_size: HEADER_SIZE as u64 + self.data_len + index_len,
        })
    }
}

impl Drop for SSTableBuilder {
    fn drop(&mut self) {
        if !self.finished {
            self.writer.take();
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
