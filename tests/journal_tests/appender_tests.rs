//! Tests for the Appender
//!
//! These tests verify:
//! - Locations are assigned back to back and readable immediately
//! - In-flight entries are retired once written
//! - Rolling to a new data file
//! - Close semantics
//! - Readers running alongside the writer always see every record

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use atlasjournal::appender::Appender;
use atlasjournal::{
    Config, DataFileAccessor, DataFileSet, InflightWrites, JournalError, Location, SyncStrategy,
};
use bytes::Bytes;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    _temp: TempDir,
    files: Arc<DataFileSet>,
    inflight: Arc<InflightWrites>,
    appender: Appender,
}

fn setup(config: Config) -> Fixture {
    let temp = TempDir::new().unwrap();
    let files = Arc::new(DataFileSet::discover(temp.path(), 2, 8).unwrap());
    let inflight = Arc::new(InflightWrites::new());
    let current = files.create_next().unwrap();
    let appender = Appender::start(Arc::clone(&files), Arc::clone(&inflight), current, &config).unwrap();
    Fixture {
        _temp: temp,
        files,
        inflight,
        appender,
    }
}

fn read(fixture: &Fixture, location: &Location) -> Bytes {
    let data_file = fixture.files.get(location.data_file_id()).unwrap();
    let mut accessor = DataFileAccessor::open(data_file, Arc::clone(&fixture.inflight)).unwrap();
    let mut location = Location::new(location.data_file_id(), location.offset());
    accessor.read_record(&mut location).unwrap()
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_assigns_consecutive_offsets() {
    let fixture = setup(Config::default());

    let first = fixture.appender.append(Bytes::from_static(b"hello"), 1, false).unwrap();
    let second = fixture.appender.append(Bytes::from_static(b"world!"), 2, false).unwrap();

    assert_eq!((first.data_file_id(), first.offset()), (1, 0));
    assert_eq!((second.data_file_id(), second.offset()), (1, 10));
    assert_eq!(first.size(), Some(10));
    assert_eq!(second.record_type(), Some(2));
}

#[test]
fn test_append_is_readable_immediately() {
    let fixture = setup(Config::default());

    let location = fixture.appender.append(Bytes::from_static(b"pending"), 1, false).unwrap();

    assert_eq!(read(&fixture, &location).as_ref(), b"pending");
}

#[test]
fn test_sync_append_is_durable_on_return() {
    let fixture = setup(Config::default());

    let location = fixture.appender.append(Bytes::from_static(b"hello"), 1, true).unwrap();

    assert!(!fixture.inflight.contains(&location));
    let path = fixture.files.get(1).unwrap().path().to_path_buf();
    assert_eq!(
        fs::read(path).unwrap(),
        vec![0x00, 0x00, 0x00, 0x0A, 0x01, 0x68, 0x65, 0x6C, 0x6C, 0x6F]
    );
}

#[test]
fn test_flush_retires_inflight_entries() {
    let fixture = setup(Config::default());
    let locations: Vec<Location> = (0..100)
        .map(|i| {
            let payload = Bytes::from(format!("record-{}", i));
            fixture.appender.append(payload, 1, false).unwrap()
        })
        .collect();

    fixture.appender.flush().unwrap();

    assert!(fixture.inflight.is_empty());
    for (i, location) in locations.iter().enumerate() {
        assert_eq!(read(&fixture, location).as_ref(), format!("record-{}", i).as_bytes());
    }
}

#[test]
fn test_on_request_strategy_writes_everything() {
    let config = Config::builder().sync_strategy(SyncStrategy::OnRequest).build();
    let fixture = setup(config);

    let location = fixture.appender.append(Bytes::from_static(b"lazy"), 1, false).unwrap();
    fixture.appender.flush().unwrap();

    assert!(fixture.inflight.is_empty());
    assert_eq!(read(&fixture, &location).as_ref(), b"lazy");
}

#[test]
fn test_small_batches() {
    let config = Config::builder().max_write_batch_size(1).build();
    let fixture = setup(config);

    let locations: Vec<Location> = (0..20)
        .map(|i| fixture.appender.append(Bytes::from(vec![i as u8; 3]), 1, false).unwrap())
        .collect();
    fixture.appender.flush().unwrap();

    for (i, location) in locations.iter().enumerate() {
        assert_eq!(read(&fixture, location).as_ref(), &[i as u8; 3]);
    }
}

// =============================================================================
// Rolling Tests
// =============================================================================

#[test]
fn test_rolls_to_new_data_file() {
    // Two 10-byte records fit, the third rolls
    let config = Config::builder().max_file_length(25).build();
    let fixture = setup(config);

    let locations: Vec<Location> = (0..5)
        .map(|_| fixture.appender.append(Bytes::from_static(b"hello"), 1, false).unwrap())
        .collect();
    fixture.appender.flush().unwrap();

    let placed: Vec<(i32, i64)> = locations
        .iter()
        .map(|l| (l.data_file_id(), l.offset()))
        .collect();
    assert_eq!(placed, vec![(1, 0), (1, 10), (2, 0), (2, 10), (3, 0)]);
    assert_eq!(fixture.files.ids(), vec![1, 2, 3]);
    assert_eq!(fixture.appender.current_data_file().id(), 3);

    for location in &locations {
        assert_eq!(read(&fixture, location).as_ref(), b"hello");
    }
}

#[test]
fn test_oversized_record_goes_to_empty_file() {
    let config = Config::builder().max_file_length(16).build();
    let fixture = setup(config);

    let big = fixture.appender.append(Bytes::from(vec![1u8; 64]), 1, true).unwrap();
    let next = fixture.appender.append(Bytes::from_static(b"x"), 1, true).unwrap();

    assert_eq!((big.data_file_id(), big.offset()), (1, 0));
    assert_eq!((next.data_file_id(), next.offset()), (2, 0));
    assert_eq!(fixture.files.get(1).unwrap().length(), 69);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_drains_queue() {
    let fixture = setup(Config::default());
    let location = fixture.appender.append(Bytes::from_static(b"last"), 1, false).unwrap();

    fixture.appender.close().unwrap();

    assert!(fixture.inflight.is_empty());
    assert_eq!(read(&fixture, &location).as_ref(), b"last");
}

#[test]
fn test_append_after_close_fails() {
    let fixture = setup(Config::default());
    fixture.appender.close().unwrap();

    let result = fixture.appender.append(Bytes::from_static(b"late"), 1, false);

    assert!(matches!(result, Err(JournalError::Closed)));
    assert!(matches!(fixture.appender.flush(), Err(JournalError::Closed)));
}

#[test]
fn test_close_twice() {
    let fixture = setup(Config::default());

    fixture.appender.close().unwrap();
    fixture.appender.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_readers_never_miss_a_record() {
    let config = Config::builder().max_file_length(4096).build();
    let fixture = Arc::new(setup(config));
    let done = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = crossbeam::channel::unbounded::<(Location, Vec<u8>)>();

    let writer = {
        let fixture = Arc::clone(&fixture);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..500u32 {
                let payload = format!("payload-{}", i).into_bytes();
                let location = fixture
                    .appender
                    .append(Bytes::from(payload.clone()), 1, i % 50 == 0)
                    .unwrap();
                sender.send((location, payload)).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            let receiver = receiver.clone();
            thread::spawn(move || {
                let mut seen = 0;
                while let Ok((location, payload)) = receiver.recv() {
                    assert_eq!(read(&fixture, &location).as_ref(), payload.as_slice());
                    seen += 1;
                }
                seen
            })
        })
        .collect();
    drop(receiver);

    writer.join().unwrap();
    let seen: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();

    assert!(done.load(Ordering::Acquire));
    assert_eq!(seen, 500);
}
