//! Appender
//!
//! The journal's only writer.
//!
//! ## Write Path
//! ```text
//!  append() ──▶ offset = length ──▶ InflightWrites::insert ──▶ channel ──▶ publish length
//!                                                                │
//!        InflightWrites::remove ◀── sync_data ◀── write batch ◀──┘
//!                                                (writer thread)
//! ```
//!
//! A record is visible to readers from the moment `append` returns: first
//! through the in-flight overlay, then from disk. The writer retires an
//! overlay entry only after the batch holding it has been written (and, with
//! [`SyncStrategy::EveryBatch`], synced), so readers never see a gap.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{BufMut, Bytes, BytesMut};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::{Config, SyncStrategy};
use crate::datafile::{DataFile, DataFileSet};
use crate::error::{JournalError, Result};
use crate::inflight::{InflightWrites, WriteCommand};
use crate::location::Location;
use crate::record::RecordHeader;

/// Messages queued between `append` and the writer thread
const WRITE_QUEUE_CAPACITY: usize = 1024;

enum WriterMessage {
    Write {
        command: Arc<WriteCommand>,
        done: Option<Sender<Result<()>>>,
    },
    Flush(Sender<Result<()>>),
}

/// Assigns locations and hands records to the background writer
pub struct Appender {
    files: Arc<DataFileSet>,

    inflight: Arc<InflightWrites>,

    max_file_length: u64,

    /// Serializes location assignment and queueing
    state: Mutex<AppendState>,

    /// First writer failure; sticky
    failure: Arc<Mutex<Option<String>>>,

    writer: Mutex<Option<JoinHandle<()>>>,
}

struct AppendState {
    /// Data file receiving new records
    current: Arc<DataFile>,
    /// `None` once the appender is closed
    sender: Option<Sender<WriterMessage>>,
}

impl Appender {
    /// Start the writer thread, appending to `current`
    pub fn start(
        files: Arc<DataFileSet>,
        inflight: Arc<InflightWrites>,
        current: Arc<DataFile>,
        config: &Config,
    ) -> Result<Self> {
        let (sender, receiver) = channel::bounded(WRITE_QUEUE_CAPACITY);
        let failure = Arc::new(Mutex::new(None));

        let writer = BatchWriter {
            files: Arc::clone(&files),
            inflight: Arc::clone(&inflight),
            receiver,
            max_batch_size: config.max_write_batch_size,
            sync_strategy: config.sync_strategy,
            failure: Arc::clone(&failure),
            handles: HashMap::new(),
        };
        let handle = thread::Builder::new()
            .name("atlasjournal-writer".to_string())
            .spawn(move || writer.run())?;

        info!(data_file_id = current.id(), offset = current.length(), "appender started");

        Ok(Self {
            files,
            inflight,
            max_file_length: config.max_file_length,
            state: Mutex::new(AppendState {
                current,
                sender: Some(sender),
            }),
            failure,
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Append a record.
    ///
    /// The returned location is readable immediately. With `sync`, this
    /// blocks until the record is durable.
    pub fn append(&self, data: Bytes, record_type: u8, sync: bool) -> Result<Location> {
        self.check_failure()?;

        let header = RecordHeader::for_payload(data.len(), record_type)?;
        let record_size = u64::from(header.size());

        let (location, done) = {
            let mut state = self.state.lock();
            let sender = state.sender.clone().ok_or(JournalError::Closed)?;

            let length = state.current.length();
            if length > 0 && length + record_size > self.max_file_length {
                let next = self.files.create_next()?;
                info!(
                    from = state.current.id(),
                    to = next.id(),
                    length,
                    "rolled to new data file"
                );
                state.current = next;
            }

            // The new length is published only after the overlay entry exists,
            // so a reader that sees it always finds the pending record
            let offset = state.current.length();
            let location = Location::resolved(state.current.id(), offset as i64, header);

            let command = Arc::new(WriteCommand::new(location, data));
            self.inflight.insert(Arc::clone(&command));

            let (done_tx, done_rx) = if sync {
                let (tx, rx) = channel::bounded(1);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            if sender.send(WriterMessage::Write { command, done: done_tx }).is_err() {
                self.inflight.remove(&location);
                let message = "writer thread is gone".to_string();
                self.failure.lock().get_or_insert(message);
                return Err(JournalError::Closed);
            }
            state.current.set_length(offset + record_size);

            (location, done_rx)
        };

        if let Some(done) = done {
            done.recv().map_err(|_| JournalError::Closed)??;
        }
        Ok(location)
    }

    /// Block until every record queued so far has been written
    pub fn flush(&self) -> Result<()> {
        let sender = self.state.lock().sender.clone().ok_or(JournalError::Closed)?;
        let (tx, rx) = channel::bounded(1);
        sender
            .send(WriterMessage::Flush(tx))
            .map_err(|_| JournalError::Closed)?;
        rx.recv().map_err(|_| JournalError::Closed)?
    }

    /// Drain the queue and stop the writer thread. Safe to call twice.
    pub fn close(&self) -> Result<()> {
        let sender = self.state.lock().sender.take();
        drop(sender);

        if let Some(handle) = self.writer.lock().take() {
            handle
                .join()
                .map_err(|_| JournalError::WriteFailed("writer thread panicked".to_string()))?;
            info!("appender stopped");
        }

        self.check_failure()
    }

    /// Data file currently receiving records
    pub fn current_data_file(&self) -> Arc<DataFile> {
        Arc::clone(&self.state.lock().current)
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(JournalError::WriteFailed(message.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for Appender {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// =============================================================================
// Writer Thread
// =============================================================================

struct BatchWriter {
    files: Arc<DataFileSet>,
    inflight: Arc<InflightWrites>,
    receiver: Receiver<WriterMessage>,
    max_batch_size: usize,
    sync_strategy: SyncStrategy,
    failure: Arc<Mutex<Option<String>>>,
    /// Write handles by data file id
    handles: HashMap<i32, File>,
}

#[derive(Default)]
struct Batch {
    commands: Vec<Arc<WriteCommand>>,
    waiters: Vec<Sender<Result<()>>>,
    sync_requested: bool,
    bytes: usize,
}

impl Batch {
    fn push(&mut self, message: WriterMessage) {
        match message {
            WriterMessage::Write { command, done } => {
                self.bytes += command.data().len();
                self.commands.push(command);
                if let Some(done) = done {
                    self.sync_requested = true;
                    self.waiters.push(done);
                }
            }
            WriterMessage::Flush(done) => self.waiters.push(done),
        }
    }
}

/// Contiguous bytes headed for one data file
struct Run {
    data_file_id: i32,
    start: u64,
    buf: BytesMut,
}

impl Run {
    fn continues(&self, location: &Location) -> bool {
        self.data_file_id == location.data_file_id()
            && self.start + self.buf.len() as u64 == location.offset() as u64
    }
}

impl BatchWriter {
    fn run(mut self) {
        while let Ok(first) = self.receiver.recv() {
            let mut batch = Batch::default();
            batch.push(first);
            while batch.bytes < self.max_batch_size {
                match self.receiver.try_recv() {
                    Ok(message) => batch.push(message),
                    Err(_) => break,
                }
            }
            self.process(batch);
        }
        debug!("writer thread exiting");
    }

    fn process(&mut self, batch: Batch) {
        let previous_failure = self.failure.lock().clone();
        let result = match previous_failure {
            Some(message) => Err(message),
            None => self.write_batch(&batch).map_err(|e| e.to_string()),
        };

        match &result {
            Ok(()) => {
                let retired = self
                    .inflight
                    .remove_all(batch.commands.iter().map(|command| command.location()));
                if retired > 0 {
                    debug!(records = retired, bytes = batch.bytes, "wrote batch");
                }
            }
            Err(message) => {
                error!(error = %message, records = batch.commands.len(), "journal write failed");
                self.failure.lock().get_or_insert_with(|| message.clone());
            }
        }

        for waiter in batch.waiters {
            let _ = waiter.send(result.clone().map_err(JournalError::WriteFailed));
        }
    }

    fn write_batch(&mut self, batch: &Batch) -> io::Result<()> {
        let mut run: Option<Run> = None;

        for command in &batch.commands {
            let location = command.location();
            let header = location.header().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "in-flight location is not resolved")
            })?;

            if !run.as_ref().is_some_and(|r| r.continues(location)) {
                let next = Run {
                    data_file_id: location.data_file_id(),
                    start: location.offset() as u64,
                    buf: BytesMut::new(),
                };
                if let Some(finished) = run.replace(next) {
                    self.write_run(finished)?;
                }
            }
            if let Some(current) = run.as_mut() {
                current.buf.put_slice(&header.encode());
                current.buf.put_slice(command.data());
            }
        }
        if let Some(finished) = run {
            self.write_run(finished)?;
        }

        if self.sync_strategy == SyncStrategy::EveryBatch || batch.sync_requested {
            for file in self.handles.values() {
                file.sync_data()?;
            }
        }

        // Older data files never receive records again: sync and close them
        if let Some(&newest) = self.handles.keys().max() {
            let stale: Vec<i32> = self.handles.keys().copied().filter(|&id| id != newest).collect();
            for id in stale {
                if let Some(file) = self.handles.remove(&id) {
                    file.sync_data()?;
                }
            }
        }
        Ok(())
    }

    fn write_run(&mut self, run: Run) -> io::Result<()> {
        let file = match self.handles.entry(run.data_file_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let data_file = self.files.get(run.data_file_id).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("data file {} is not open", run.data_file_id),
                    )
                })?;
                entry.insert(data_file.open_writer()?)
            }
        };
        file.seek(SeekFrom::Start(run.start))?;
        file.write_all(&run.buf)
    }
}
