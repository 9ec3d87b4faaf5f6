//! # lsmkv
//!
//! An embedded, ordered key-value store built as a log-structured merge tree:
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with torn-tail handling
//! - Immutable, memory-mapped SSTables with an offset index
//! - Background flush and full compaction
//! - Lock-free reads against versioned table snapshots
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │          upsert / get / range / flush / compact              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │──── frozen ───┐
//!   │  (Append)   │          │  (SkipMap)  │               │
//!   └─────────────┘          └─────────────┘               ▼
//!                                                 ┌─────────────────┐
//!                                                 │  flush worker   │
//!                                                 └────────┬────────┘
//!                                                          ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │  TableCatalog: MANIFEST + snapshot of SSTables (newest first) │
//!   └──────────────────────────────────────────────────────────────┘
//!                                   ▲
//!                          ┌────────┴────────┐
//!                          │ compaction worker│
//!                          └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod comparator;
pub mod entry;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod merge;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LsmError, Result};
pub use config::{Config, WalSyncStrategy};
pub use engine::Engine;
pub use entry::Entry;
pub use merge::LiveEntries;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lsmkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
