use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use casefile::edit::{EditLockManager, EditOutcome};
use casefile::error::CasefileError;
use casefile::schema::Table;
use tempfile::TempDir;

fn manager(dir: &TempDir) -> EditLockManager {
    EditLockManager::new(dir.path().join("edit_locks")).with_poll_interval(Duration::from_millis(10))
}

#[test]
fn acquire_writes_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir);
    edits.request_edit_lock(Table::Persons, 7, || ()).unwrap();
    let path = edits.lock_path(Table::Persons, 7);
    assert!(path.ends_with("edit_lock_Persons_7.lock"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "Editing Persons where ID is 7\n");
    assert!(edits.release_edit_lock(Table::Persons, 7).unwrap());
    assert!(!path.exists());
}

#[test]
fn second_editor_waits_for_release() {
    let dir = tempfile::tempdir().unwrap();
    let first = manager(&dir);
    let second = manager(&dir);
    first.request_edit_lock(Table::Cases, 3, || ()).unwrap();
    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let flag = Arc::clone(&acquired);
            second
                .request_edit_lock(Table::Cases, 3, move || flag.store(true, Ordering::SeqCst))
                .unwrap();
            second
        })
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst), "both editors hold the same row");
    assert!(first.release_edit_lock(Table::Cases, 3).unwrap());
    let second = waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert!(second.is_locked(Table::Cases, 3));
    assert!(second.release_edit_lock(Table::Cases, 3).unwrap());
}

#[test]
fn different_rows_do_not_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let first = manager(&dir);
    let second = manager(&dir);
    first.request_edit_lock(Table::Documents, 1, || ()).unwrap();
    second.request_edit_lock(Table::Documents, 2, || ()).unwrap();
    assert!(first.is_locked(Table::Documents, 2));
}

#[test]
fn cancel_while_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let edits = Arc::new(manager(&dir));
    fs::create_dir_all(edits.dir()).unwrap();
    let held = edits.lock_path(Table::Persons, 9);
    fs::write(&held, "Editing Persons where ID is 9\n").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let waiter = {
        let edits = Arc::clone(&edits);
        let calls = Arc::clone(&calls);
        thread::spawn(move || {
            edits.request_edit_lock(Table::Persons, 9, move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(edits.cancel_edit_lock().unwrap(), Some(EditOutcome::Cancelled));
    assert!(matches!(
        waiter.join().unwrap(),
        Err(CasefileError::EditCancelled { row: 9, .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // the other holder's lock stays
    assert!(held.exists());
}

#[test]
fn cancel_after_acquire_removes_lock() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    edits
        .request_edit_lock(Table::Cases, 4, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(edits.is_locked(Table::Cases, 4));
    assert_eq!(edits.cancel_edit_lock().unwrap(), Some(EditOutcome::Acquired));
    assert!(!edits.is_locked(Table::Cases, 4));
    assert_eq!(edits.cancel_edit_lock().unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn releasing_absent_lock_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir);
    assert!(!edits.release_edit_lock(Table::Persons, 1).unwrap());
}

#[test]
fn bounded_wait_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir).with_timeout(Some(Duration::from_millis(60)));
    fs::create_dir_all(edits.dir()).unwrap();
    let held = edits.lock_path(Table::Documents, 5);
    fs::write(&held, "Editing Documents where ID is 5\n").unwrap();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let result = edits.request_edit_lock(Table::Documents, 5, move || flag.store(true, Ordering::SeqCst));
    assert!(matches!(result, Err(CasefileError::LockTimeout { .. })));
    assert!(!called.load(Ordering::SeqCst));
    assert!(held.exists());
}

#[test]
fn begun_wait_acquires_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir);
    let (tx, rx) = std::sync::mpsc::channel();
    edits
        .begin_edit_lock(Table::Cases, 11, move || tx.send(()).unwrap())
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(edits.is_locked(Table::Cases, 11));
    assert!(edits.release_edit_lock(Table::Cases, 11).unwrap());
}

#[test]
fn dropping_manager_stops_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir);
    fs::create_dir_all(edits.dir()).unwrap();
    let held = edits.lock_path(Table::Persons, 3);
    fs::write(&held, "Editing Persons where ID is 3\n").unwrap();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    edits
        .begin_edit_lock(Table::Persons, 3, move || flag.store(true, Ordering::SeqCst))
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    drop(edits);
    // the worker has exited and dropped its callback unused
    assert_eq!(Arc::strong_count(&called), 1);
    assert!(!called.load(Ordering::SeqCst));
    assert!(held.exists());
}

#[test]
fn dropping_manager_keeps_taken_lock() {
    let dir = tempfile::tempdir().unwrap();
    let edits = manager(&dir);
    edits.request_edit_lock(Table::Documents, 8, || ()).unwrap();
    let path = edits.lock_path(Table::Documents, 8);
    drop(edits);
    assert!(path.exists());
}
