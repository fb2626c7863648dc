//! Data File Accessor
//!
//! Synchronous record reader and updater bound to one handle of one segment.
//!
//! ## Read Path
//! 1. Reject invalid locations
//! 2. Serve the in-flight payload if the appender has not made it durable yet
//! 3. Otherwise seek into the file, decoding the header on first access and
//!    caching size/type on the location for the next read
//!
//! An accessor is single-threaded and non-reentrant: every operation takes
//! `&mut self`. Use an [`AccessorPool`](super::AccessorPool) to share
//! accessors between threads.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::inflight::InflightWrites;
use crate::location::Location;
use crate::record::{RecordHeader, HEADER_SIZE};

use super::DataFile;

/// Reader/updater for a single data file
pub struct DataFileAccessor {
    /// Segment this accessor is bound to
    data_file: Arc<DataFile>,

    /// Overlay of not-yet-durable writes, shared with the appender
    inflight: Arc<InflightWrites>,

    /// Owned handle; `None` once disposed
    file: Option<File>,
}

impl DataFileAccessor {
    /// Borrow a handle from `data_file` and bind an accessor to it
    pub fn open(data_file: Arc<DataFile>, inflight: Arc<InflightWrites>) -> Result<Self> {
        let file = data_file.open_handle()?;
        Ok(Self {
            data_file,
            inflight,
            file: Some(file),
        })
    }

    pub fn data_file(&self) -> &Arc<DataFile> {
        &self.data_file
    }

    pub fn is_disposed(&self) -> bool {
        self.file.is_none()
    }

    /// Return the handle to the data file. Safe to call more than once.
    ///
    /// Close failures are logged and swallowed.
    pub fn dispose(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(e) = self.data_file.close_handle(file) {
            warn!(
                data_file_id = self.data_file.id(),
                error = %e,
                "failed to close data file handle"
            );
        }
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Read the payload of the record at `location`.
    ///
    /// Resolves and caches the record header on `location` if it was not
    /// known yet. Every failure is reported as `InvalidLocation`.
    pub fn read_record(&mut self, location: &mut Location) -> Result<Bytes> {
        let file = Self::handle(&mut self.file, &self.data_file)?;

        if !location.is_valid() {
            return Err(JournalError::invalid_location(
                location,
                io::Error::new(io::ErrorKind::InvalidInput, "location is not valid"),
            ));
        }

        if let Some(pending) = self.inflight.get(location) {
            if let Some(header) = pending.location().header() {
                location.set_header(header);
            }
            return Ok(pending.data().clone());
        }

        let length = self.data_file.length();
        Self::read_payload(file, location, length)
            .map_err(|e| JournalError::invalid_location(location, e))
    }

    /// Raw positional read: no header, no overlay.
    ///
    /// I/O errors come back unwrapped as `JournalError::Io`.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let file = Self::handle(&mut self.file, &self.data_file)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Resolve the size and type of the record at `location` without
    /// reading its payload.
    pub fn read_location_details(&mut self, location: &mut Location) -> Result<()> {
        let file = Self::handle(&mut self.file, &self.data_file)?;

        if !location.is_valid() {
            return Err(JournalError::invalid_location(
                location,
                io::Error::new(io::ErrorKind::InvalidInput, "location is not valid"),
            ));
        }

        if let Some(pending) = self.inflight.get(location) {
            if let Some(header) = pending.location().header() {
                location.set_header(header);
                return Ok(());
            }
        }

        let length = self.data_file.length();
        let header = Self::read_header(file, location, length)
            .map_err(|e| JournalError::invalid_location(location, e))?;
        location.set_header(header);
        Ok(())
    }

    /// Overwrite the payload of the record at `location` in place.
    ///
    /// Writes `min(data.len(), payload capacity)` bytes and returns that
    /// count: the record never grows and its header is never rewritten.
    /// The overlay is not consulted; callers must not update a location the
    /// appender still holds in flight.
    pub fn update_record(&mut self, location: &Location, data: &[u8], sync: bool) -> Result<usize> {
        let file = Self::handle(&mut self.file, &self.data_file)?;

        if !location.is_valid() {
            return Err(JournalError::invalid_location(
                location,
                io::Error::new(io::ErrorKind::InvalidInput, "location is not valid"),
            ));
        }

        let length = self.data_file.length();
        Self::write_payload(file, location, length, data, sync)
            .map_err(|e| JournalError::invalid_location(location, e))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn handle<'a>(file: &'a mut Option<File>, data_file: &DataFile) -> Result<&'a mut File> {
        file.as_mut().ok_or(JournalError::AccessorDisposed {
            data_file_id: data_file.id(),
        })
    }

    /// Offset of `location` as u64, rejecting offsets at or past `length`
    fn checked_offset(location: &Location, length: u64) -> io::Result<u64> {
        let offset = u64::try_from(location.offset()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "negative record offset")
        })?;
        if offset >= length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("offset {} is at or past the end of the data file ({} bytes)", offset, length),
            ));
        }
        Ok(offset)
    }

    /// Check that a record of `size` bytes at `offset` lies within `length`
    fn check_extent(offset: u64, size: u32, length: u64) -> io::Result<()> {
        let end = offset.checked_add(u64::from(size)).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "record end overflows")
        })?;
        if end > length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record ends at {} past the end of the data file ({} bytes)", end, length),
            ));
        }
        Ok(())
    }

    fn read_header(file: &mut File, location: &Location, length: u64) -> io::Result<RecordHeader> {
        let offset = Self::checked_offset(location, length)?;
        file.seek(SeekFrom::Start(offset))?;
        RecordHeader::read_from(file)
    }

    fn read_payload(file: &mut File, location: &mut Location, length: u64) -> io::Result<Bytes> {
        let offset = Self::checked_offset(location, length)?;

        // Header already cached: skip straight to the payload
        let header = match location.header() {
            Some(header) => {
                file.seek(SeekFrom::Start(offset + HEADER_SIZE as u64))?;
                header
            }
            None => {
                file.seek(SeekFrom::Start(offset))?;
                RecordHeader::read_from(file)?
            }
        };
        Self::check_extent(offset, header.size(), length)?;

        let mut payload = vec![0u8; header.payload_len()];
        file.read_exact(&mut payload)?;

        location.set_header(header);
        Ok(Bytes::from(payload))
    }

    fn write_payload(
        file: &mut File,
        location: &Location,
        length: u64,
        data: &[u8],
        sync: bool,
    ) -> io::Result<usize> {
        let offset = Self::checked_offset(location, length)?;
        let header = location.header().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "record size is not resolved")
        })?;
        Self::check_extent(offset, header.size(), length)?;

        let written = data.len().min(header.payload_len());
        file.seek(SeekFrom::Start(offset + HEADER_SIZE as u64))?;
        file.write_all(&data[..written])?;
        if sync {
            file.sync_data()?;
        }

        debug!(
            data_file_id = location.data_file_id(),
            offset = location.offset(),
            written,
            sync,
            "updated record"
        );
        Ok(written)
    }
}

impl Drop for DataFileAccessor {
    fn drop(&mut self) {
        self.dispose();
    }
}
