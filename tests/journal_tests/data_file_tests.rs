//! Tests for DataFile and DataFileSet
//!
//! These tests verify:
//! - Naming and discovery of `db-<id>.log` files
//! - Length reservation
//! - Handle lending, reuse and bounding
//! - Truncation and retirement

use std::fs;
use std::path::Path;
use std::sync::Arc;

use atlasjournal::{DataFile, DataFileAccessor, DataFileSet, InflightWrites, DEFAULT_MAX_OPEN_HANDLES};
use tempfile::TempDir;

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_file_name() {
    assert_eq!(DataFile::file_name(1), "db-1.log");
    assert_eq!(DataFile::file_name(42), "db-42.log");
}

#[test]
fn test_parse_id() {
    assert_eq!(DataFile::parse_id(Path::new("/tmp/db-42.log")), Some(42));
    assert_eq!(DataFile::parse_id(Path::new("db-0.log")), Some(0));

    assert_eq!(DataFile::parse_id(Path::new("db-x.log")), None);
    assert_eq!(DataFile::parse_id(Path::new("db--1.log")), None);
    assert_eq!(DataFile::parse_id(Path::new("db-1.tmp")), None);
    assert_eq!(DataFile::parse_id(Path::new("other.log")), None);
}

// =============================================================================
// Create / Open Tests
// =============================================================================

#[test]
fn test_create_empty_file() {
    let temp = TempDir::new().unwrap();

    let data_file = DataFile::create(temp.path(), 3, 2).unwrap();

    assert_eq!(data_file.id(), 3);
    assert_eq!(data_file.length(), 0);
    assert_eq!(data_file.path(), temp.path().join("db-3.log"));
    assert!(data_file.path().exists());
}

#[test]
fn test_create_existing_fails() {
    let temp = TempDir::new().unwrap();
    DataFile::create(temp.path(), 1, 2).unwrap();

    assert!(DataFile::create(temp.path(), 1, 2).is_err());
}

#[test]
fn test_open_takes_length_from_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db-7.log");
    fs::write(&path, [0u8; 123]).unwrap();

    let data_file = DataFile::open(&path, 7, 2).unwrap();

    assert_eq!(data_file.length(), 123);
}

#[test]
fn test_reserve_returns_previous_length() {
    let temp = TempDir::new().unwrap();
    let data_file = DataFile::create(temp.path(), 1, 2).unwrap();

    assert_eq!(data_file.reserve(10), 0);
    assert_eq!(data_file.reserve(7), 10);
    assert_eq!(data_file.length(), 17);
}

// =============================================================================
// Handle Tests
// =============================================================================

#[test]
fn test_handles_are_reused() {
    let temp = TempDir::new().unwrap();
    let data_file = DataFile::create(temp.path(), 1, 2).unwrap();

    let handle = data_file.open_handle().unwrap();
    assert_eq!(data_file.open_handle_count(), 1);

    data_file.close_handle(handle).unwrap();
    assert_eq!(data_file.open_handle_count(), 1); // kept idle

    let _again = data_file.open_handle().unwrap();
    assert_eq!(data_file.open_handle_count(), 1);
}

#[test]
fn test_idle_handles_are_bounded() {
    let temp = TempDir::new().unwrap();
    let data_file = DataFile::create(temp.path(), 1, 2).unwrap();

    let handles: Vec<_> = (0..5).map(|_| data_file.open_handle().unwrap()).collect();
    assert_eq!(data_file.open_handle_count(), 5);

    for handle in handles {
        data_file.close_handle(handle).unwrap();
    }
    assert_eq!(data_file.open_handle_count(), 2);
}

#[test]
fn test_open_handles_are_bounded() {
    let temp = TempDir::new().unwrap();
    let data_file = DataFile::create(temp.path(), 1, 2)
        .unwrap()
        .with_max_open_handles(3);

    let handles: Vec<_> = (0..3).map(|_| data_file.open_handle().unwrap()).collect();
    assert!(data_file.open_handle().is_err());
    assert_eq!(data_file.open_handle_count(), 3);

    // A returned handle makes room again
    let mut handles = handles.into_iter();
    data_file.close_handle(handles.next().unwrap()).unwrap();
    let _reused = data_file.open_handle().unwrap();
    assert!(data_file.open_handle().is_err());
}

#[test]
fn test_accessors_share_the_open_handle_bound() {
    let temp = TempDir::new().unwrap();
    let data_file = Arc::new(DataFile::create(temp.path(), 1, 2).unwrap());
    let inflight = Arc::new(InflightWrites::new());
    assert_eq!(data_file.max_open_handles(), DEFAULT_MAX_OPEN_HANDLES);

    let mut accessors = Vec::new();
    let mut refused = 0;
    for _ in 0..200 {
        match DataFileAccessor::open(Arc::clone(&data_file), Arc::clone(&inflight)) {
            Ok(accessor) => accessors.push(accessor),
            Err(_) => refused += 1,
        }
    }

    assert_eq!(accessors.len(), DEFAULT_MAX_OPEN_HANDLES);
    assert_eq!(refused, 200 - DEFAULT_MAX_OPEN_HANDLES);
    assert_eq!(data_file.open_handle_count(), DEFAULT_MAX_OPEN_HANDLES);

    drop(accessors);
    assert_eq!(data_file.open_handle_count(), 2);
}

#[test]
fn test_data_file_set_applies_open_handle_bound() {
    let temp = TempDir::new().unwrap();
    let files = DataFileSet::discover(temp.path(), 1, 1).unwrap();
    let data_file = files.create_next().unwrap();

    let _lent = data_file.open_handle().unwrap();

    assert_eq!(data_file.max_open_handles(), 1);
    assert!(data_file.open_handle().is_err());
}

#[test]
fn test_retire_closes_idle_handles() {
    let temp = TempDir::new().unwrap();
    let data_file = DataFile::create(temp.path(), 1, 4).unwrap();

    let idle = data_file.open_handle().unwrap();
    let lent = data_file.open_handle().unwrap();
    data_file.close_handle(idle).unwrap();

    data_file.retire();
    assert!(data_file.is_retired());
    assert_eq!(data_file.open_handle_count(), 1);

    data_file.close_handle(lent).unwrap();
    assert_eq!(data_file.open_handle_count(), 0);
}

#[test]
fn test_truncate() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db-1.log");
    fs::write(&path, [1u8; 50]).unwrap();
    let data_file = DataFile::open(&path, 1, 2).unwrap();

    data_file.truncate(20).unwrap();

    assert_eq!(data_file.length(), 20);
    assert_eq!(fs::metadata(&path).unwrap().len(), 20);
}

// =============================================================================
// DataFileSet Tests
// =============================================================================

#[test]
fn test_discover_empty_directory() {
    let temp = TempDir::new().unwrap();
    let directory = temp.path().join("journal");

    let files = DataFileSet::discover(&directory, 2, 8).unwrap();

    assert!(directory.is_dir());
    assert!(files.is_empty());
    assert!(files.first().is_none());
    assert!(files.last().is_none());
}

#[test]
fn test_discover_ignores_other_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("db-2.log"), b"").unwrap();
    fs::write(temp.path().join("db-10.log"), b"").unwrap();
    fs::write(temp.path().join("notes.txt"), b"").unwrap();
    fs::create_dir(temp.path().join("db-3.log")).unwrap();

    let files = DataFileSet::discover(temp.path(), 2, 8).unwrap();

    assert_eq!(files.ids(), vec![2, 10]);
    assert_eq!(files.first().unwrap().id(), 2);
    assert_eq!(files.last().unwrap().id(), 10);
}

#[test]
fn test_create_next() {
    let temp = TempDir::new().unwrap();
    let files = DataFileSet::discover(temp.path(), 2, 8).unwrap();

    assert_eq!(files.create_next().unwrap().id(), 1);
    assert_eq!(files.create_next().unwrap().id(), 2);
    assert_eq!(files.len(), 2);
    assert!(temp.path().join("db-2.log").exists());
}

#[test]
fn test_after() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("db-1.log"), b"").unwrap();
    fs::write(temp.path().join("db-4.log"), b"").unwrap();
    let files = DataFileSet::discover(temp.path(), 2, 8).unwrap();

    assert_eq!(files.after(1).unwrap().id(), 4);
    assert_eq!(files.after(2).unwrap().id(), 4);
    assert!(files.after(4).is_none());
}
