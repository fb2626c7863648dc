//! In-flight Writes
//!
//! Overlay of appended-but-not-yet-durable records.
//!
//! ## Concurrency
//! - One writer (the appender) inserts and removes entries
//! - Any number of accessors look entries up concurrently
//! - Entries are `Arc<WriteCommand>` swapped in and out under a
//!   `parking_lot::RwLock`, so a lookup sees either the whole entry or none
//!
//! An entry exists from the moment the appender assigns a location until the
//! record bytes are durable on disk. While it exists it is the source of
//! truth for reads of that location.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::location::Location;

/// A record accepted by the appender but not yet durable
#[derive(Debug, Clone)]
pub struct WriteCommand {
    /// Location as assigned by the appender (always resolved)
    location: Location,
    /// Exact payload bytes
    data: Bytes,
}

impl WriteCommand {
    pub fn new(location: Location, data: Bytes) -> Self {
        Self { location, data }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Concurrent map of pending writes, shared by one journal instance
#[derive(Debug, Default)]
pub struct InflightWrites {
    entries: RwLock<HashMap<Location, Arc<WriteCommand>>>,
}

impl InflightWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the pending write for `location`
    pub fn get(&self, location: &Location) -> Option<Arc<WriteCommand>> {
        self.entries.read().get(location).cloned()
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.entries.read().contains_key(location)
    }

    /// Publish a pending write; returns the entry it replaced, if any
    pub fn insert(&self, command: Arc<WriteCommand>) -> Option<Arc<WriteCommand>> {
        let key = *command.location();
        self.entries.write().insert(key, command)
    }

    /// Retire a pending write once its bytes are durable
    pub fn remove(&self, location: &Location) -> Option<Arc<WriteCommand>> {
        self.entries.write().remove(location)
    }

    /// Retire a whole batch under one lock acquisition
    pub fn remove_all<'a, I>(&self, locations: I) -> usize
    where
        I: IntoIterator<Item = &'a Location>,
    {
        let mut entries = self.entries.write();
        locations
            .into_iter()
            .filter(|location| entries.remove(location).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
