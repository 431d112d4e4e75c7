//! End-to-end exercises of the reentrant, thread-scoped file lock.

use bytes_core::FileLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn reentrant_same_thread_locking_does_not_deadlock() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let lock = FileLock::open(tmp.path()).unwrap();
    lock.lock().unwrap();
    lock.lock().unwrap();
    lock.lock().unwrap();
    assert!(lock.is_held());
    lock.unlock().unwrap();
    lock.unlock().unwrap();
    assert!(lock.is_held());
    lock.unlock().unwrap();
    assert!(!lock.is_held());
}

#[test]
fn a_waiting_thread_proceeds_only_after_the_holder_releases() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let lock = Arc::new(FileLock::open(tmp.path()).unwrap());
    lock.lock().unwrap();

    let progressed = Arc::new(AtomicBool::new(false));
    let waiter_lock = lock.clone();
    let waiter_progressed = progressed.clone();
    let waiter = thread::spawn(move || {
        waiter_lock.lock().unwrap();
        waiter_progressed.store(true, Ordering::SeqCst);
        waiter_lock.unlock().unwrap();
    });

    thread::sleep(Duration::from_millis(30));
    assert!(!progressed.load(Ordering::SeqCst));
    lock.unlock().unwrap();
    waiter.join().unwrap();
    assert!(progressed.load(Ordering::SeqCst));
}

#[test]
fn try_lock_reports_contention_without_blocking() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let lock = Arc::new(FileLock::open(tmp.path()).unwrap());
    lock.lock().unwrap();

    let other = lock.clone();
    let failed_fast = thread::spawn(move || other.try_lock().unwrap())
        .join()
        .unwrap();
    assert!(!failed_fast);

    lock.unlock().unwrap();
    assert!(lock.try_lock().unwrap());
}

#[test]
fn two_separate_lock_handles_over_the_same_path_still_exclude_each_other() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let first = Arc::new(FileLock::open(tmp.path()).unwrap());
    let second = FileLock::open(tmp.path()).unwrap();

    first.lock().unwrap();
    assert!(!second.try_lock().unwrap());
    first.unlock().unwrap();
    assert!(second.try_lock().unwrap());
    second.unlock().unwrap();
}
