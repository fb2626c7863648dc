//! Tests for InflightWrites
//!
//! These tests verify:
//! - Insert / lookup / remove
//! - Lookup by an unresolved location
//! - Readers never observe a torn entry while the writer churns

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use atlasjournal::{InflightWrites, Location, RecordHeader, WriteCommand};
use bytes::Bytes;

fn command(data_file_id: i32, offset: i64, payload: &'static [u8]) -> Arc<WriteCommand> {
    let header = RecordHeader::for_payload(payload.len(), 1).unwrap();
    Arc::new(WriteCommand::new(
        Location::resolved(data_file_id, offset, header),
        Bytes::from_static(payload),
    ))
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_new_is_empty() {
    let inflight = InflightWrites::new();

    assert!(inflight.is_empty());
    assert_eq!(inflight.len(), 0);
    assert!(inflight.get(&Location::new(1, 0)).is_none());
}

#[test]
fn test_insert_and_get() {
    let inflight = InflightWrites::new();
    inflight.insert(command(1, 0, b"pending"));

    let found = inflight.get(&Location::new(1, 0)).unwrap();

    assert_eq!(found.data().as_ref(), b"pending");
    assert_eq!(found.location().size(), Some(12));
    assert!(inflight.contains(&Location::new(1, 0)));
}

#[test]
fn test_insert_replaces() {
    let inflight = InflightWrites::new();
    assert!(inflight.insert(command(1, 0, b"a")).is_none());

    let previous = inflight.insert(command(1, 0, b"b")).unwrap();

    assert_eq!(previous.data().as_ref(), b"a");
    assert_eq!(inflight.len(), 1);
}

#[test]
fn test_remove() {
    let inflight = InflightWrites::new();
    inflight.insert(command(1, 0, b"x"));

    let removed = inflight.remove(&Location::new(1, 0)).unwrap();

    assert_eq!(removed.data().as_ref(), b"x");
    assert!(inflight.is_empty());
    assert!(inflight.remove(&Location::new(1, 0)).is_none());
}

#[test]
fn test_remove_all() {
    let inflight = InflightWrites::new();
    inflight.insert(command(1, 0, b"a"));
    inflight.insert(command(1, 6, b"b"));
    inflight.insert(command(2, 0, b"c"));

    let batch = [Location::new(1, 0), Location::new(1, 6), Location::new(9, 9)];
    let removed = inflight.remove_all(batch.iter());

    assert_eq!(removed, 2);
    assert_eq!(inflight.len(), 1);
    assert!(inflight.contains(&Location::new(2, 0)));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers_see_whole_entries() {
    let inflight = Arc::new(InflightWrites::new());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let inflight = Arc::clone(&inflight);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut hits = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    for offset in 0..16 {
                        if let Some(found) = inflight.get(&Location::new(1, offset)) {
                            assert_eq!(found.location().offset(), offset);
                            assert_eq!(found.data().as_ref(), b"payload");
                            hits += 1;
                        }
                    }
                }
                hits
            })
        })
        .collect();

    for _ in 0..2_000 {
        for offset in 0..16 {
            inflight.insert(command(1, offset, b"payload"));
        }
        for offset in 0..16 {
            inflight.remove(&Location::new(1, offset));
        }
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
    assert!(inflight.is_empty());
}

#[test]
fn test_lookup_after_insert_sees_entry() {
    let inflight = Arc::new(InflightWrites::new());
    inflight.insert(command(5, 100, b"visible"));

    let reader = {
        let inflight = Arc::clone(&inflight);
        thread::spawn(move || inflight.get(&Location::new(5, 100)).map(|c| c.data().clone()))
    };

    assert_eq!(reader.join().unwrap().unwrap().as_ref(), b"visible");
}
