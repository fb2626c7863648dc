//! Journal Module
//!
//! Ties the data files, in-flight overlay, appender and accessor pool
//! together behind one handle.
//!
//! ## Responsibilities
//! - Discover and recover data files on startup
//! - Route writes to the appender and reads to pooled accessors
//! - Iterate every record in file/offset order
//! - Shut everything down in order on close

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use crate::appender::Appender;
use crate::config::Config;
use crate::datafile::{AccessorLease, AccessorPool, DataFile, DataFileAccessor, DataFileSet};
use crate::error::{JournalError, Result};
use crate::inflight::InflightWrites;
use crate::location::Location;
use crate::recovery::{scan_data_file, RecoveryResult};

/// An append-only, rolling-file journal
///
/// ## Concurrency Model: Single Writer / Multiple Readers
///
/// - **Writes**: serialized by the appender; `write` may be called from any
///   thread and returns as soon as the record is visible
/// - **Reads**: each read leases its own accessor from the pool, so readers
///   never share a file position
/// - **Visibility**: a record is served from the in-flight overlay until its
///   bytes are on disk, then from the data file
pub struct Journal {
    config: Config,

    files: Arc<DataFileSet>,

    /// Overlay shared by the appender and every accessor
    inflight: Arc<InflightWrites>,

    appender: Appender,

    pool: AccessorPool,

    recovery: RecoveryResult,

    closed: AtomicBool,
}

impl Journal {
    /// Open or create a journal with the given config
    ///
    /// On startup:
    /// 1. Create the directory and discover data files
    /// 2. Scan each data file and cut off torn tails
    /// 3. Start the appender on the newest data file
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Discover existing data files
        let files = Arc::new(DataFileSet::discover(
            &config.directory,
            config.max_idle_handles_per_file,
            config.max_open_handles_per_file,
        )?);
        let inflight = Arc::new(InflightWrites::new());

        // Step 2: Recover
        let recovery = Self::recover(&files, &inflight)?;
        if recovery.files_scanned > 0 {
            info!(
                files = recovery.files_scanned,
                records = recovery.records_recovered,
                truncated_files = recovery.files_truncated,
                truncated_bytes = recovery.bytes_truncated,
                "journal recovery complete"
            );
        }

        // Step 3: Start appending to the newest data file
        let current = match files.last() {
            Some(file) => file,
            None => files.create_next()?,
        };
        let appender = Appender::start(
            Arc::clone(&files),
            Arc::clone(&inflight),
            current,
            &config,
        )?;
        let pool = AccessorPool::new(Arc::clone(&inflight), config.max_idle_accessors_per_file);

        info!(directory = %config.directory.display(), "journal opened");

        Ok(Self {
            config,
            files,
            inflight,
            appender,
            pool,
            recovery,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().directory(path).build())
    }

    fn recover(files: &DataFileSet, inflight: &Arc<InflightWrites>) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();

        for data_file in files.all() {
            let scan = {
                let mut accessor = DataFileAccessor::open(Arc::clone(&data_file), Arc::clone(inflight))?;
                scan_data_file(&mut accessor)?
            };

            if scan.is_torn() {
                warn!(
                    data_file_id = data_file.id(),
                    valid_length = scan.valid_length,
                    torn_bytes = scan.torn_bytes(),
                    "truncating torn data file tail"
                );
                data_file.truncate(scan.valid_length)?;
            }
            result.add(&scan);
        }

        Ok(result)
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Append a record, returning its location.
    ///
    /// The record is readable as soon as this returns. With `sync`, the call
    /// also waits until it is durable.
    pub fn write(&self, data: impl Into<Bytes>, record_type: u8, sync: bool) -> Result<Location> {
        self.appender.append(data.into(), record_type, sync)
    }

    /// Read the payload at `location`, caching its header on the location
    pub fn read(&self, location: &mut Location) -> Result<Bytes> {
        let mut accessor = self.accessor_for(location)?;
        accessor.read_record(location)
    }

    /// Resolve the size and type at `location` without reading the payload
    pub fn read_location_details(&self, location: &mut Location) -> Result<()> {
        let mut accessor = self.accessor_for(location)?;
        accessor.read_location_details(location)
    }

    /// Overwrite a record's payload in place, returning the bytes written.
    ///
    /// Input longer than the record's payload is truncated. If the record is
    /// still in flight, waits for the appender to write it first.
    pub fn update(&self, location: &Location, data: &[u8], sync: bool) -> Result<usize> {
        if self.inflight.contains(location) {
            self.appender.flush()?;
        }

        let mut location = *location;
        let mut accessor = self.accessor_for(&location)?;
        if !location.is_resolved() {
            accessor.read_location_details(&mut location)?;
        }
        accessor.update_record(&location, data, sync)
    }

    /// Location of the record following `after`, or the first record when
    /// `after` is `None`. Crosses data file boundaries.
    pub fn next(&self, after: Option<&Location>) -> Result<Option<Location>> {
        let mut candidate = match after {
            None => match self.files.first() {
                Some(file) => Location::new(file.id(), 0),
                None => return Ok(None),
            },
            Some(after) => {
                let mut resolved = *after;
                if !resolved.is_resolved() {
                    self.read_location_details(&mut resolved)?;
                }
                match resolved.end_offset() {
                    Some(end) => Location::new(resolved.data_file_id(), end),
                    None => return Ok(None),
                }
            }
        };

        loop {
            let Some(data_file) = self.files.get(candidate.data_file_id()) else {
                return Ok(None);
            };

            if candidate.offset() as u64 >= data_file.length() {
                match self.files.after(data_file.id()) {
                    Some(next) => {
                        candidate = Location::new(next.id(), 0);
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            let mut accessor = self.pool.open(&data_file)?;
            accessor.read_location_details(&mut candidate)?;
            return Ok(Some(candidate));
        }
    }

    /// Iterate over the location of every record, oldest first
    pub fn redo(&self) -> Redo<'_> {
        Redo {
            journal: self,
            last: None,
            done: false,
        }
    }

    /// Block until every record written so far is on disk
    pub fn sync(&self) -> Result<()> {
        self.appender.flush()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_file_ids(&self) -> Vec<i32> {
        self.files.ids()
    }

    pub fn data_file(&self, id: i32) -> Option<Arc<DataFile>> {
        self.files.get(id)
    }

    /// The in-flight overlay shared with the appender
    pub fn inflight(&self) -> &Arc<InflightWrites> {
        &self.inflight
    }

    pub fn pool(&self) -> &AccessorPool {
        &self.pool
    }

    /// What recovery found when the journal was opened
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Stop the appender, then release every pooled accessor and handle.
    /// Safe to call twice.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.appender.close();
        self.pool.close();
        self.files.retire_all();

        info!(directory = %self.config.directory.display(), "journal closed");
        result
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn accessor_for(&self, location: &Location) -> Result<AccessorLease<'_>> {
        if !location.is_valid() {
            return Err(JournalError::invalid_location(
                location,
                io::Error::new(io::ErrorKind::InvalidInput, "location is not valid"),
            ));
        }
        let data_file = self.files.get(location.data_file_id()).ok_or_else(|| {
            JournalError::invalid_location(
                location,
                io::Error::new(io::ErrorKind::NotFound, "no such data file"),
            )
        })?;
        self.pool.open(&data_file)
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Iterator over every record location, see [`Journal::redo`]
pub struct Redo<'a> {
    journal: &'a Journal,
    last: Option<Location>,
    done: bool,
}

impl Iterator for Redo<'_> {
    type Item = Result<Location>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.journal.next(self.last.as_ref()) {
            Ok(Some(location)) => {
                self.last = Some(location);
                Some(Ok(location))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
