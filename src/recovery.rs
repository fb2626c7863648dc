//! Data File Recovery
//!
//! Walks record headers to find where the valid prefix of a data file ends.
//!
//! A crash in the middle of an append can leave a torn record (or a run of
//! zeroes from preallocation) at the tail of the newest data file. The scan
//! stops at the first header that cannot describe a record, or at a record
//! that runs past the end of the file. Everything before that point is the
//! valid prefix.

use crate::datafile::DataFileAccessor;
use crate::error::{JournalError, Result};
use crate::location::Location;
use crate::record::HEADER_SIZE;

/// Outcome of scanning one data file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Number of complete records found
    pub records: u64,

    /// Length of the valid record prefix
    pub valid_length: u64,

    /// Length of the data file when the scan started
    pub file_length: u64,
}

impl ScanResult {
    /// Whether bytes follow the last complete record
    pub fn is_torn(&self) -> bool {
        self.valid_length < self.file_length
    }

    pub fn torn_bytes(&self) -> u64 {
        self.file_length - self.valid_length
    }

    /// Fail with `Corruption` if bytes follow the last complete record
    pub fn ensure_intact(&self, data_file_id: i32) -> Result<()> {
        if self.is_torn() {
            return Err(JournalError::Corruption(format!(
                "data file {} has {} unreadable bytes after offset {} ({} complete records)",
                data_file_id,
                self.torn_bytes(),
                self.valid_length,
                self.records
            )));
        }
        Ok(())
    }
}

/// Totals over every data file recovered when a journal opens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of data files scanned
    pub files_scanned: u64,

    /// Number of complete records found
    pub records_recovered: u64,

    /// Number of data files whose torn tail was cut off
    pub files_truncated: u64,

    /// Bytes removed from torn tails
    pub bytes_truncated: u64,
}

impl RecoveryResult {
    pub fn add(&mut self, scan: &ScanResult) {
        self.files_scanned += 1;
        self.records_recovered += scan.records;
        if scan.is_torn() {
            self.files_truncated += 1;
            self.bytes_truncated += scan.torn_bytes();
        }
    }
}

/// Scan the accessor's data file, counting complete records
pub fn scan_data_file(accessor: &mut DataFileAccessor) -> Result<ScanResult> {
    scan_data_file_with(accessor, |_| {})
}

/// Scan the accessor's data file, passing every complete record's resolved
/// location to `visit` in offset order
pub fn scan_data_file_with<F>(accessor: &mut DataFileAccessor, mut visit: F) -> Result<ScanResult>
where
    F: FnMut(&Location),
{
    let data_file_id = accessor.data_file().id();
    let file_length = accessor.data_file().length();

    let mut offset = 0u64;
    let mut records = 0u64;

    while file_length - offset >= HEADER_SIZE as u64 {
        let mut location = Location::new(data_file_id, offset as i64);
        match accessor.read_location_details(&mut location) {
            Ok(()) => {}
            Err(e) if e.is_invalid_location() => break,
            Err(e) => return Err(e),
        }

        let Some(end) = location.end_offset() else {
            break;
        };
        let end = end as u64;
        if end > file_length {
            break;
        }

        visit(&location);
        records += 1;
        offset = end;
    }

    Ok(ScanResult {
        records,
        valid_length: offset,
        file_length,
    })
}
