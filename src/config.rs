//! Configuration for AtlasJournal
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::datafile::DEFAULT_MAX_OPEN_HANDLES;
use crate::error::{JournalError, Result};
use crate::record::HEADER_SIZE;

/// Main configuration for a journal instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the data files
    /// Internal structure:
    ///   {directory}/
    ///     ├── db-1.log
    ///     ├── db-2.log
    ///     └── ...
    pub directory: PathBuf,

    /// Roll to a new data file once the current one would exceed this size
    pub max_file_length: u64,

    // -------------------------------------------------------------------------
    // Appender Configuration
    // -------------------------------------------------------------------------
    /// Max bytes of payload the writer thread handles in one batch
    pub max_write_batch_size: usize,

    /// When the writer forces batches to stable storage
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Reader Configuration
    // -------------------------------------------------------------------------
    /// Idle OS handles each data file keeps for reuse
    pub max_idle_handles_per_file: usize,

    /// OS handles each data file may have open at once (lent + idle)
    pub max_open_handles_per_file: usize,

    /// Idle accessors the pool keeps per data file
    pub max_idle_accessors_per_file: usize,
}

/// Writer sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync every batch before its in-flight entries are retired (safest)
    EveryBatch,

    /// fsync only batches that contain a write requested with `sync = true`
    OnRequest,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./atlasjournal_data"),
            max_file_length: 32 * 1024 * 1024,     // 32 MB
            max_write_batch_size: 4 * 1024 * 1024, // 4 MB
            sync_strategy: SyncStrategy::EveryBatch,
            max_idle_handles_per_file: 4,
            max_open_handles_per_file: DEFAULT_MAX_OPEN_HANDLES,
            max_idle_accessors_per_file: 5,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the journal cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_file_length < HEADER_SIZE as u64 {
            return Err(JournalError::Config(format!(
                "max_file_length must be at least {} bytes, got {}",
                HEADER_SIZE, self.max_file_length
            )));
        }
        if self.max_write_batch_size == 0 {
            return Err(JournalError::Config(
                "max_write_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_open_handles_per_file == 0 {
            return Err(JournalError::Config(
                "max_open_handles_per_file must be greater than zero".to_string(),
            ));
        }
        if self.max_idle_handles_per_file > self.max_open_handles_per_file {
            return Err(JournalError::Config(format!(
                "max_idle_handles_per_file ({}) exceeds max_open_handles_per_file ({})",
                self.max_idle_handles_per_file, self.max_open_handles_per_file
            )));
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
    /// Set the journal directory
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.directory = path.into();
        self
    }

    /// Set the roll threshold (in bytes)
    pub fn max_file_length(mut self, bytes: u64) -> Self {
        self.config.max_file_length = bytes;
        self
    }

    /// Set the max batch size (in bytes)
    pub fn max_write_batch_size(mut self, bytes: usize) -> Self {
        self.config.max_write_batch_size = bytes;
        self
    }

    /// Set the writer sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the idle handle bound per data file
    pub fn max_idle_handles_per_file(mut self, count: usize) -> Self {
        self.config.max_idle_handles_per_file = count;
        self
    }

    /// Set the open handle bound per data file
    pub fn max_open_handles_per_file(mut self, count: usize) -> Self {
        self.config.max_open_handles_per_file = count;
        self
    }

    /// Set the idle accessor bound per data file
    pub fn max_idle_accessors_per_file(mut self, count: usize) -> Self {
        self.config.max_idle_accessors_per_file = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
