/// Concurrency behavior of the facade: appends from many threads serialize
/// on the internal mutex and replay in fsync order, and the advisory locks
/// keep a second handle away from a live directory.
use std::sync::Arc;
use std::thread;

use seglog::{Entry, Wal, WalError};
use tempfile::TempDir;

#[test]
fn test_concurrent_appends_serialize() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal");

    let wal = Arc::new(Wal::create(&path).unwrap());

    // Each thread appends a disjoint index range; the mutex serializes the
    // writes so every entry lands whole.
    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let wal = wal.clone();
            thread::spawn(move || {
                for i in 0..25u64 {
                    let index = t * 100 + i;
                    wal.append(&Entry::new(index, index.to_le_bytes().to_vec()))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    wal.close().unwrap();

    let wal = Wal::open(&path).unwrap();
    let entries = wal.read_all(0).unwrap();
    assert_eq!(entries.len(), 100);

    // Every appended entry is present exactly once with its payload intact,
    // and entries of one thread appear in that thread's order.
    let mut seen: Vec<u64> = entries.iter().map(|e| e.index).collect();
    for entry in &entries {
        assert_eq!(entry.payload, entry.index.to_le_bytes());
    }
    for t in 0..4u64 {
        let thread_order: Vec<u64> = seen
            .iter()
            .copied()
            .filter(|i| i / 100 == t)
            .collect();
        let mut sorted = thread_order.clone();
        sorted.sort();
        assert_eq!(thread_order, sorted);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 100);
}

#[test]
fn test_live_directory_refuses_second_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal");

    let wal = Wal::create(&path).unwrap();
    wal.append(&Entry::new(0, &b"held"[..])).unwrap();

    // The segment lock is still held by the first handle.
    assert!(matches!(Wal::open(&path), Err(WalError::Locked(_))));

    drop(wal);
    assert!(Wal::open(&path).is_ok());
}

#[test]
fn test_drop_releases_locks_without_close() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal");

    {
        let wal = Wal::create(&path).unwrap();
        wal.append(&Entry::new(7, &b"payload"[..])).unwrap();
        // No close: the handle goes out of scope.
    }

    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.read_all(0).unwrap(), vec![Entry::new(7, &b"payload"[..])]);
}
