//! Accessor Pool
//!
//! Leases exclusive [`DataFileAccessor`]s so many threads can read the same
//! segment without sharing a non-thread-safe accessor.
//!
//! ## Concurrency:
//! - `state`: one mutex around the idle lists; never held across file I/O
//! - A lease owns its accessor outright until it is dropped

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{JournalError, Result};
use crate::inflight::InflightWrites;

use super::{DataFile, DataFileAccessor};

/// Pool of idle accessors, keyed by data file id
pub struct AccessorPool {
    /// Overlay handed to every accessor the pool creates
    inflight: Arc<InflightWrites>,

    /// Idle accessors kept per data file
    max_idle_per_file: usize,

    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<i32, Vec<DataFileAccessor>>,
    /// Data files closed through the pool; their accessors are not reused
    retired: HashSet<i32>,
    closed: bool,
}

impl AccessorPool {
    pub fn new(inflight: Arc<InflightWrites>, max_idle_per_file: usize) -> Self {
        Self {
            inflight,
            max_idle_per_file,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Lease an accessor for `data_file`, reusing an idle one when possible
    pub fn open(&self, data_file: &Arc<DataFile>) -> Result<AccessorLease<'_>> {
        let id = data_file.id();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(JournalError::Closed);
            }
            if state.retired.contains(&id) {
                return Err(JournalError::UnknownDataFile(id));
            }
            if let Some(accessor) = state.idle.get_mut(&id).and_then(Vec::pop) {
                return Ok(AccessorLease::new(self, accessor));
            }
        }

        let accessor = DataFileAccessor::open(Arc::clone(data_file), Arc::clone(&self.inflight))?;
        Ok(AccessorLease::new(self, accessor))
    }

    /// Dispose the idle accessors of one data file and stop pooling it
    pub fn close_data_file(&self, id: i32) {
        let idle = {
            let mut state = self.state.lock();
            state.retired.insert(id);
            state.idle.remove(&id).unwrap_or_default()
        };
        Self::dispose_all(idle);
    }

    /// Dispose every idle accessor; later `open` calls fail with `Closed`
    pub fn close(&self) {
        let idle: Vec<DataFileAccessor> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.idle.drain().flat_map(|(_, accessors)| accessors).collect()
        };
        Self::dispose_all(idle);
    }

    /// Idle accessors currently pooled for `id`
    pub fn idle_count(&self, id: i32) -> usize {
        self.state.lock().idle.get(&id).map_or(0, Vec::len)
    }

    fn release(&self, mut accessor: DataFileAccessor) {
        if accessor.is_disposed() {
            return;
        }

        let id = accessor.data_file().id();
        {
            let mut state = self.state.lock();
            let reusable = !state.closed
                && !state.retired.contains(&id)
                && !accessor.data_file().is_retired();
            if reusable {
                let idle = state.idle.entry(id).or_default();
                if idle.len() < self.max_idle_per_file {
                    idle.push(accessor);
                    return;
                }
            }
        }

        accessor.dispose();
    }

    fn dispose_all(accessors: Vec<DataFileAccessor>) {
        if accessors.is_empty() {
            return;
        }
        debug!(count = accessors.len(), "disposing idle accessors");
        for mut accessor in accessors {
            accessor.dispose();
        }
    }
}

/// Exclusive use of one pooled accessor; returned to the pool on drop
pub struct AccessorLease<'a> {
    pool: &'a AccessorPool,
    accessor: Option<DataFileAccessor>,
}

impl<'a> AccessorLease<'a> {
    fn new(pool: &'a AccessorPool, accessor: DataFileAccessor) -> Self {
        Self {
            pool,
            accessor: Some(accessor),
        }
    }

    /// Dispose the accessor instead of returning it, e.g. after a handle fault
    pub fn discard(mut self) {
        if let Some(mut accessor) = self.accessor.take() {
            accessor.dispose();
        }
    }
}

impl Deref for AccessorLease<'_> {
    type Target = DataFileAccessor;

    fn deref(&self) -> &DataFileAccessor {
        // Only `discard` and `drop` take the accessor, and both consume the lease
        self.accessor.as_ref().unwrap()
    }
}

impl DerefMut for AccessorLease<'_> {
    fn deref_mut(&mut self) -> &mut DataFileAccessor {
        self.accessor.as_mut().unwrap()
    }
}

impl Drop for AccessorLease<'_> {
    fn drop(&mut self) {
        if let Some(accessor) = self.accessor.take() {
            self.pool.release(accessor);
        }
    }
}
