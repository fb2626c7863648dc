//! Data File
//!
//! One rolling, append-only journal segment and the OS handles it lends out.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{FILE_PREFIX, FILE_SUFFIX};

/// Default upper bound on handles open at once for one segment
pub const DEFAULT_MAX_OPEN_HANDLES: usize = 64;

/// A single journal segment on disk
///
/// ## Concurrency:
/// - `length`: atomic, published by the appender after the record is in flight
/// - `idle_handles`: mutex-protected stack of handles ready to be lent out;
///   new handles are only opened while this lock is held
/// - All methods use `&self`; a `DataFile` is shared as `Arc<DataFile>`
#[derive(Debug)]
pub struct DataFile {
    /// Segment id, also encoded in the file name
    id: i32,

    /// Path of the segment file
    path: PathBuf,

    /// Logical length: every byte below it belongs to an assigned record
    length: AtomicU64,

    /// Handles returned by accessors, reused before opening new ones
    idle_handles: Mutex<Vec<File>>,

    /// Upper bound on `idle_handles`
    max_idle_handles: usize,

    /// Upper bound on lent + idle handles
    max_open_handles: usize,

    /// Handles currently lent out
    lent_handles: AtomicUsize,

    /// Set once the segment has been retired; no more handles are pooled
    retired: AtomicBool,
}

impl DataFile {
    /// Create a new, empty segment file
    pub fn create(directory: &Path, id: i32, max_idle_handles: usize) -> io::Result<Self> {
        let path = Self::path_for(directory, id);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!(data_file_id = id, path = %path.display(), "created data file");
        Ok(Self::with_length(id, path, 0, max_idle_handles))
    }

    /// Open an existing segment file; its length is taken from the file system
    pub fn open(path: &Path, id: i32, max_idle_handles: usize) -> io::Result<Self> {
        let length = fs::metadata(path)?.len();
        Ok(Self::with_length(id, path.to_path_buf(), length, max_idle_handles))
    }

    fn with_length(id: i32, path: PathBuf, length: u64, max_idle_handles: usize) -> Self {
        Self {
            id,
            path,
            length: AtomicU64::new(length),
            idle_handles: Mutex::new(Vec::new()),
            max_idle_handles,
            max_open_handles: DEFAULT_MAX_OPEN_HANDLES.max(max_idle_handles),
            lent_handles: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
        }
    }

    /// Bound the number of handles open at once (lent + idle).
    ///
    /// Never lower than one.
    pub fn with_max_open_handles(mut self, max_open_handles: usize) -> Self {
        self.max_open_handles = max_open_handles.max(1);
        self
    }

    pub fn max_open_handles(&self) -> usize {
        self.max_open_handles
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current logical length in bytes
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    /// Reserve `size` bytes at the end of the file, returning their offset
    pub fn reserve(&self, size: u64) -> u64 {
        self.length.fetch_add(size, Ordering::AcqRel)
    }

    /// Publish a new logical length
    pub(crate) fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Release);
    }

    // =========================================================================
    // Handle Lending
    // =========================================================================

    /// Lend a read/write handle, reusing an idle one when available.
    ///
    /// Fails once `max_open_handles` handles are already lent out.
    pub fn open_handle(&self) -> io::Result<File> {
        let mut idle = self.idle_handles.lock();
        let file = match idle.pop() {
            Some(file) => file,
            None => {
                let lent = self.lent_handles.load(Ordering::Acquire);
                if lent >= self.max_open_handles {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!(
                            "data file {} already has {} open handles (limit {})",
                            self.id, lent, self.max_open_handles
                        ),
                    ));
                }
                let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
                debug!(data_file_id = self.id, "opened data file handle");
                file
            }
        };
        self.lent_handles.fetch_add(1, Ordering::AcqRel);
        Ok(file)
    }

    /// Take back a handle lent by [`DataFile::open_handle`]
    ///
    /// Up to `max_idle_handles` are kept for reuse; the rest are closed.
    pub fn close_handle(&self, file: File) -> io::Result<()> {
        self.lent_handles.fetch_sub(1, Ordering::AcqRel);

        if !self.retired.load(Ordering::Acquire) {
            let mut idle = self.idle_handles.lock();
            if idle.len() < self.max_idle_handles {
                idle.push(file);
                return Ok(());
            }
        }

        drop(file);
        debug!(data_file_id = self.id, "closed data file handle");
        Ok(())
    }

    /// Number of OS handles currently open for this file (lent + idle)
    pub fn open_handle_count(&self) -> usize {
        self.lent_handles.load(Ordering::Acquire) + self.idle_handles.lock().len()
    }

    /// Open a write handle for the appender
    pub fn open_writer(&self) -> io::Result<File> {
        OpenOptions::new().write(true).open(&self.path)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Cut the file back to `length` bytes and make that durable
    pub fn truncate(&self, length: u64) -> io::Result<()> {
        let file = self.open_writer()?;
        file.set_len(length)?;
        file.sync_all()?;
        self.set_length(length);
        Ok(())
    }

    /// Stop pooling handles and close the idle ones.
    ///
    /// Handles still lent out are closed as they come back.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        let idle: Vec<File> = std::mem::take(&mut *self.idle_handles.lock());
        if !idle.is_empty() {
            debug!(data_file_id = self.id, closed = idle.len(), "retired data file");
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    // =========================================================================
    // Naming
    // =========================================================================

    /// File name for a segment id: "db-42.log"
    pub fn file_name(id: i32) -> String {
        format!("{}{}{}", FILE_PREFIX, id, FILE_SUFFIX)
    }

    pub fn path_for(directory: &Path, id: i32) -> PathBuf {
        directory.join(Self::file_name(id))
    }

    /// Parse a segment id from a path: "db-42.log" → Some(42)
    pub fn parse_id(path: &Path) -> Option<i32> {
        let name = path.file_name()?.to_str()?;
        let id = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
        id.parse().ok().filter(|id: &i32| *id >= 0)
    }
}
