//! # AtlasJournal
//!
//! An append-only, rolling-file journal with:
//! - A fixed 5-byte record header shared by writer and readers
//! - Read-after-write visibility of records that are not yet durable
//! - A single background writer that batches and syncs appends
//! - Pooled, single-owner accessors for concurrent synchronous reads
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Journal                             │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │ write                       │ read
//!                 ▼                             ▼
//!         ┌──────────────┐              ┌──────────────┐
//!         │   Appender   │              │ AccessorPool │
//!         │ (1 writer)   │              └──────┬───────┘
//!         └──┬────────┬──┘                     │ lease
//!   insert / │        │ write + sync           ▼
//!   remove   ▼        │              ┌──────────────────┐
//!   ┌────────────────┐│   consults   │ DataFileAccessor │
//!   │ InflightWrites │◀──────────────┤   (per reader)   │
//!   └────────────────┘│              └────────┬─────────┘
//!                     ▼                       │ seek + read
//!              ┌────────────────────────────────────────┐
//!              │      DataFile  db-1.log, db-2.log ...  │
//!              └────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod location;
pub mod record;
pub mod inflight;
pub mod datafile;
pub mod appender;
pub mod recovery;
pub mod journal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{JournalError, Result};
pub use config::{Config, SyncStrategy};
pub use location::Location;
pub use record::{RecordHeader, HEADER_SIZE};
pub use inflight::{InflightWrites, WriteCommand};
pub use datafile::{
    AccessorLease, AccessorPool, DataFile, DataFileAccessor, DataFileSet, DEFAULT_MAX_OPEN_HANDLES,
};
pub use journal::Journal;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasJournal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
