//! Configuration for lsmkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LsmError, Result};

/// Main configuration for an lsmkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all store files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST           (live SSTables, oldest first)
    ///     ├── 000001.sst ...     (SSTable files)
    ///     └── wal_000002.log ... (one WAL per memtable generation)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Memtable size (key + value bytes) that triggers a flush
    pub flush_threshold_bytes: u64,

    /// Frozen memtables allowed to wait for the flush worker before
    /// writes are rejected with `Overloaded`
    pub max_pending_flushes: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// SSTable count that schedules a background compaction (0 = manual only)
    pub compaction_trigger: usize,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Log every upsert before applying it to the memtable
    pub wal_enabled: bool,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./lsmkv_data"),
            flush_threshold_bytes: 4 * 1024 * 1024, // 4 MB
            max_pending_flushes: 2,
            compaction_trigger: 4,
            wal_enabled: true,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold_bytes == 0 {
            return Err(LsmError::Config(
                "flush_threshold_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_pending_flushes == 0 {
            return Err(LsmError::Config(
                "max_pending_flushes must be at least 1".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(LsmError::Config(
                "wal sync interval must be at least 1 entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn flush_threshold_bytes(mut self, size: u64) -> Self {
        self.config.flush_threshold_bytes = size;
        self
    }

    /// Set how many frozen memtables may wait for flush
    pub fn max_pending_flushes(mut self, count: usize) -> Self {
        self.config.max_pending_flushes = count;
        self
    }

    /// Set the SSTable count that triggers background compaction
    pub fn compaction_trigger(mut self, count: usize) -> Self {
        self.config.compaction_trigger = count;
        self
    }

    /// Enable or disable the write-ahead log
    pub fn wal_enabled(mut self, enabled: bool) -> Self {
        self.config.wal_enabled = enabled;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
