//! Error types for AtlasJournal
//!
//! Provides a unified error type for all operations.

use std::io;

use thiserror::Error;

use crate::location::Location;

/// Result type alias using JournalError
pub type Result<T> = std::result::Result<T, JournalError>;

/// Unified error type for AtlasJournal operations
#[derive(Debug, Error)]
pub enum JournalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    /// A location could not be resolved or read. Always carries the offending
    /// location so callers can decide between "corrupt" and "retry elsewhere".
    #[error("Invalid location: {location}: {source}")]
    InvalidLocation {
        location: Location,
        #[source]
        source: io::Error,
    },

    #[error("Data file accessor for file {data_file_id} has been disposed")]
    AccessorDisposed { data_file_id: i32 },

    #[error("Unknown data file: {0}")]
    UnknownDataFile(i32),

    #[error("Journal corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Appender Errors
    // -------------------------------------------------------------------------
    #[error("Journal write failed: {0}")]
    WriteFailed(String),

    #[error("Journal is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl JournalError {
    /// Wrap an I/O failure that happened while handling `location`
    pub fn invalid_location(location: &Location, source: io::Error) -> Self {
        JournalError::InvalidLocation {
            location: *location,
            source,
        }
    }

    /// Whether this error means "this location could not be read"
    pub fn is_invalid_location(&self) -> bool {
        matches!(self, JournalError::InvalidLocation { .. })
    }
}
