//! Data File Set
//!
//! Maps segment ids to open [`DataFile`]s for one journal directory.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Create the next segment when the appender rolls
//! - Answer "which segment comes after this one" for scans

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::DataFile;

/// All segments of one journal, ordered by id
#[derive(Debug)]
pub struct DataFileSet {
    /// Directory where segments live
    directory: PathBuf,

    /// Idle handle bound passed to every segment
    max_idle_handles: usize,

    /// Open handle bound passed to every segment
    max_open_handles: usize,

    /// Open segments, oldest → newest
    files: RwLock<BTreeMap<i32, Arc<DataFile>>>,
}

impl DataFileSet {
    /// Discover the segments already present in `directory`
    pub fn discover(
        directory: &Path,
        max_idle_handles: usize,
        max_open_handles: usize,
    ) -> io::Result<Self> {
        fs::create_dir_all(directory)?;

        let mut files = BTreeMap::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }
            if let Some(id) = DataFile::parse_id(&path) {
                let data_file = DataFile::open(&path, id, max_idle_handles)?
                    .with_max_open_handles(max_open_handles);
                files.insert(id, Arc::new(data_file));
            }
        }

        if !files.is_empty() {
            info!(
                directory = %directory.display(),
                data_files = files.len(),
                "discovered data files"
            );
        }

        Ok(Self {
            directory: directory.to_path_buf(),
            max_idle_handles,
            max_open_handles,
            files: RwLock::new(files),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn get(&self, id: i32) -> Option<Arc<DataFile>> {
        self.files.read().get(&id).cloned()
    }

    pub fn first(&self) -> Option<Arc<DataFile>> {
        self.files.read().values().next().cloned()
    }

    pub fn last(&self) -> Option<Arc<DataFile>> {
        self.files.read().values().next_back().cloned()
    }

    /// The segment with the smallest id greater than `id`
    pub fn after(&self, id: i32) -> Option<Arc<DataFile>> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.files
            .read()
            .range((Excluded(id), Unbounded))
            .next()
            .map(|(_, file)| Arc::clone(file))
    }

    /// Segment ids, oldest first
    pub fn ids(&self) -> Vec<i32> {
        self.files.read().keys().copied().collect()
    }

    /// Snapshot of all segments, oldest first
    pub fn all(&self) -> Vec<Arc<DataFile>> {
        self.files.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Create the segment following the newest one (id 1 for an empty journal)
    pub fn create_next(&self) -> io::Result<Arc<DataFile>> {
        let mut files = self.files.write();
        let id = files.keys().next_back().map(|&id| id + 1).unwrap_or(1);
        let data_file = Arc::new(
            DataFile::create(&self.directory, id, self.max_idle_handles)?
                .with_max_open_handles(self.max_open_handles),
        );
        files.insert(id, Arc::clone(&data_file));
        Ok(data_file)
    }

    /// Retire every segment, closing idle handles
    pub fn retire_all(&self) {
        for file in self.files.read().values() {
            file.retire();
        }
    }
}
