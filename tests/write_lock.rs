use std::fs;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use casefile::access::{DatabaseAccess, NewPerson};
use casefile::config::Settings;
use casefile::error::CasefileError;
use casefile::lock::{LockCoordinator, marker_busy};
use tempfile::TempDir;

fn coordinator(dir: &TempDir) -> LockCoordinator {
    LockCoordinator::new(dir.path().join("write.lock"), dir.path().join("read.lock"))
        .with_poll_interval(Duration::from_millis(2))
}

#[test]
fn writers_exclude_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let locks = Arc::new(coordinator(&dir));
    let holders = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..6)
        .map(|_| {
            let locks = Arc::clone(&locks);
            let holders = Arc::clone(&holders);
            let entries = Arc::clone(&entries);
            thread::spawn(move || {
                for _ in 0..5 {
                    let guard = locks.acquire_write().unwrap();
                    assert!(guard.marker().exists());
                    let before = holders.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(before, 0, "two writers held the marker at once");
                    thread::sleep(Duration::from_millis(1));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    entries.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(entries.load(Ordering::SeqCst), 30);
    assert!(!locks.is_write_held());
}

#[test]
fn marker_records_holder() {
    let dir = tempfile::tempdir().unwrap();
    let locks = coordinator(&dir);
    let guard = locks.acquire_write().unwrap();
    let holder = locks.write_holder().expect("marker content");
    assert!(holder.starts_with(&std::process::id().to_string()));
    drop(guard);
    assert!(locks.write_holder().is_none());
}

#[test]
fn readers_do_not_block_readers() {
    let dir = tempfile::tempdir().unwrap();
    let locks = coordinator(&dir).with_timeout(Some(Duration::from_millis(200)));
    let first = locks.acquire_read().unwrap();
    let second = locks.acquire_read().unwrap();
    assert_eq!(fs::read(locks.read_marker()).unwrap().len(), 2);
    drop(first);
    drop(second);
    assert_eq!(fs::read(locks.read_marker()).unwrap().len(), 4);
}

#[test]
fn readers_wait_for_writer() {
    let dir = tempfile::tempdir().unwrap();
    let locks = Arc::new(coordinator(&dir));
    let guard = locks.acquire_write().unwrap();
    let reader = {
        let locks = Arc::clone(&locks);
        thread::spawn(move || {
            let _read = locks.acquire_read().unwrap();
            locks.is_write_held()
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!reader.is_finished());
    drop(guard);
    assert!(!reader.join().unwrap());
}

// A crashed holder leaves its marker behind and nothing reclaims it; only a
// bounded wait gets the caller out.
#[test]
fn stale_marker_blocks_until_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let locks = coordinator(&dir).with_timeout(Some(Duration::from_millis(50)));
    fs::write(locks.write_marker(), "4242 2024-01-01T00:00:00+00:00\n").unwrap();
    assert!(matches!(locks.acquire_write(), Err(CasefileError::LockTimeout { .. })));
    assert!(matches!(locks.acquire_read(), Err(CasefileError::LockTimeout { .. })));
    assert!(locks.is_write_held());
}

fn open(dir: &TempDir) -> DatabaseAccess {
    let settings = Settings {
        lock_poll_ms: 5,
        ..Settings::in_dir(dir.path())
    };
    DatabaseAccess::open(&settings).unwrap()
}

#[test]
fn marker_cleared_after_failed_statement() {
    let dir = tempfile::tempdir().unwrap();
    let access = open(&dir);
    let log_before = fs::read(access.change_log().path()).unwrap_or_default();
    let err = access.execute("INSERT INTO Persons (no_such_column) VALUES (?)", [1]);
    assert!(matches!(err, Err(CasefileError::Persistence(_))));
    assert!(!access.locks().is_write_held());
    let log_after = fs::read(access.change_log().path()).unwrap_or_default();
    assert_eq!(log_before, log_after);
}

#[test]
fn failed_write_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let access = open(&dir);
    let result: Result<(), CasefileError> = access.write(|scope| {
        scope.execute(
            "INSERT INTO Persons (last_name, first_name, address, birth_date, contact_info, gender, description, notes, can_be_lawyer) VALUES ('Doe', 'Jane', '', '', '', 'Female', '', '', 0)",
            [],
        )?;
        scope.execute("INSERT INTO Cases (nb) VALUES (?)", ["not a number"])?;
        Ok(())
    });
    assert!(result.is_err());
    assert!(!access.locks().is_write_held());
    assert!(access.person_ids().unwrap().is_empty());
    access.add_person(&NewPerson::default()).unwrap();
    assert_eq!(access.person_ids().unwrap().len(), 1);
}

#[test]
fn permission_denied_is_busy_only_with_marker() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("write.lock");
    let denied = io::Error::from(ErrorKind::PermissionDenied);
    assert!(!marker_busy(&denied, &marker));
    fs::write(&marker, "4242\n").unwrap();
    assert!(marker_busy(&denied, &marker));
    assert!(marker_busy(&io::Error::from(ErrorKind::AlreadyExists), &marker));
    assert!(!marker_busy(&io::Error::from(ErrorKind::NotFound), &marker));
}

#[test]
fn unusable_marker_directory_fails_without_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");
    // no timeout: a busy verdict would wait forever
    let locks = LockCoordinator::new(missing.join("write.lock"), missing.join("read.lock"));
    assert!(matches!(locks.acquire_write(), Err(CasefileError::Io(_))));
}
