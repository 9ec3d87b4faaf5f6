//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::Result;
use crate::LsmError;

/// Record header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing within one file
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl From<&Entry> for Operation {
    fn from(entry: &Entry) -> Self {
        match &entry.value {
            Some(value) => Operation::Put {
                key: entry.key.to_vec(),
                value: value.to_vec(),
            },
            None => Operation::Delete {
                key: entry.key.to_vec(),
            },
        }
    }
}

impl Operation {
    /// The memtable entry this operation replays as
    pub fn into_entry(self) -> Entry {
        match self {
            Operation::Put { key, value } => Entry::put(Bytes::from(key), Bytes::from(value)),
            Operation::Delete { key } => Entry::tombstone(Bytes::from(key)),
        }
    }
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self { lsn, operation }
    }

    /// Frame this entry as `[lsn][crc][len][payload]`
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_record(self.lsn, &self.operation)
    }

    /// Rebuild an entry from a verified payload
    pub fn decode(lsn: u64, payload: &[u8]) -> Result<Self> {
        let operation = bincode::deserialize(payload)?;
        Ok(Self { lsn, operation })
    }
}

pub(crate) fn encode_record(lsn: u64, operation: &Operation) -> Result<Vec<u8>> {
    let payload = bincode::serialize(operation)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| LsmError::Serialization("WAL record too large".to_string()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&lsn.to_le_bytes());
    frame.extend_from_slice(&compute_crc(lsn, &payload).to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// CRC32 over the LSN and payload of a record
pub(crate) fn compute_crc(lsn: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
