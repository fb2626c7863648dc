//! Record Location
//!
//! Addresses a single record inside the journal.
//!
//! ## Identity
//! A location is identified by `(data_file_id, offset)` only. The record
//! header (total size and type byte) is resolved lazily the first time the
//! record is read and cached on the location; it never takes part in
//! equality, hashing or ordering. That lets an unresolved location handed out
//! to a reader find the in-flight entry the appender keyed by its fully
//! resolved twin.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::record::{RecordHeader, HEADER_SIZE};

/// Position of a record within the journal
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    /// Id of the data file that holds the record
    data_file_id: i32,

    /// Byte offset of the record header within that file
    offset: i64,

    /// Resolved header, `None` until read from the overlay or disk
    header: Option<RecordHeader>,
}

impl Location {
    /// Create an unresolved location
    pub fn new(data_file_id: i32, offset: i64) -> Self {
        Self {
            data_file_id,
            offset,
            header: None,
        }
    }

    /// Create a location whose header is already known (appender side)
    pub fn resolved(data_file_id: i32, offset: i64, header: RecordHeader) -> Self {
        Self {
            data_file_id,
            offset,
            header: Some(header),
        }
    }

    pub fn data_file_id(&self) -> i32 {
        self.data_file_id
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Total record size including the header, if resolved
    pub fn size(&self) -> Option<u32> {
        self.header.map(|h| h.size())
    }

    /// Application-defined record type, if resolved
    pub fn record_type(&self) -> Option<u8> {
        self.header.map(|h| h.record_type())
    }

    pub fn header(&self) -> Option<RecordHeader> {
        self.header
    }

    pub fn is_resolved(&self) -> bool {
        self.header.is_some()
    }

    /// Cache the record header on this location.
    ///
    /// Resolution is deterministic for a given file, so setting the same
    /// header twice is harmless.
    pub fn set_header(&mut self, header: RecordHeader) {
        self.header = Some(header);
    }

    /// Drop the cached header so the next read decodes it again
    pub fn clear_header(&mut self) {
        self.header = None;
    }

    /// Whether the location can possibly address a record
    pub fn is_valid(&self) -> bool {
        if self.data_file_id < 0 || self.offset < 0 {
            return false;
        }
        match self.header {
            Some(h) => h.size() >= HEADER_SIZE as u32,
            None => true,
        }
    }

    /// Payload length, if resolved
    pub fn payload_len(&self) -> Option<usize> {
        self.header.map(|h| h.payload_len())
    }

    /// Offset of the first byte after this record, if resolved
    pub fn end_offset(&self) -> Option<i64> {
        self.size().map(|size| self.offset + i64::from(size))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Serialize this location for storage in a higher-level index
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| JournalError::Serialization(e.to_string()))
    }

    /// Deserialize a location previously produced by [`Location::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| JournalError::Serialization(e.to_string()))
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.data_file_id == other.data_file_id && self.offset == other.offset
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_file_id.hash(state);
        self.offset.hash(state);
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data_file_id
            .cmp(&other.data_file_id)
            .then(self.offset.cmp(&other.offset))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.data_file_id, self.offset)?;
        if let Some(h) = self.header {
            write!(f, " (size={}, type={})", h.size(), h.record_type())?;
        }
        Ok(())
    }
}
