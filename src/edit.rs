//! Per-row edit locks with a cancellable background wait.
//!
//! An edit lock is a file `edit_lock_<Table>_<row>.lock` in the shared edit-lock
//! directory. [`EditLockManager::request_edit_lock`] starts a worker thread that
//! polls until the file is absent, creates it atomically and runs the caller's
//! callback once; the caller blocks on a channel until then. Cancellation is
//! cooperative via a shared `Arc<AtomicBool>`: the worker observes it between
//! polls, and a lock taken just before the cancellation landed is removed again.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{CasefileError, Result};
use crate::lock::marker_busy;
use crate::schema::Table;

/// Cancellation token shared with the worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    /// Sleeps for `duration` unless cancelled first; false when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;
        let slice = Duration::from_millis(20);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            thread::sleep(slice.min(until - now));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditKey {
    pub table: Table,
    pub row: i64,
}

impl EditKey {
    pub fn file_name(&self) -> String {
        format!("edit_lock_{}_{}.lock", self.table, self.row)
    }
}

/// How a background wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Acquired,
    Cancelled,
    Failed,
}

struct PendingEdit {
    key: EditKey,
    cancel: CancelToken,
    join: JoinHandle<EditOutcome>,
}

impl PendingEdit {
    fn stop(self) -> EditOutcome {
        self.cancel.cancel();
        self.join.join().unwrap_or(EditOutcome::Failed)
    }
}

pub struct EditLockManager {
    dir: PathBuf,
    poll: Duration,
    timeout: Option<Duration>,
    pending: Mutex<Option<PendingEdit>>,
}

impl EditLockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll: Duration::from_secs(1),
            timeout: None,
            pending: Mutex::new(None),
        }
    }
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.edit_lock_path())
            .with_poll_interval(settings.edit_poll())
            .with_timeout(settings.edit_timeout())
    }
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
    pub fn dir(&self) -> &Path {
        &self.dir
    }
    pub fn lock_path(&self, table: Table, row: i64) -> PathBuf {
        self.dir.join(EditKey { table, row }.file_name())
    }
    pub fn is_locked(&self, table: Table, row: i64) -> bool {
        self.lock_path(table, row).exists()
    }

    fn pending(&self) -> Result<MutexGuard<'_, Option<PendingEdit>>> {
        self.pending
            .lock()
            .map_err(|e| CasefileError::Lock(e.to_string()))
    }

    /// Blocks until the edit lock for `(table, row)` is held by this manager,
    /// running `on_acquired` exactly once when it is taken. Any earlier request
    /// still waiting is cancelled first.
    pub fn request_edit_lock<F>(&self, table: Table, row: i64, on_acquired: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let rx = self.start(table, row, on_acquired)?;
        let received = match self.timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => None,
                RecvTimeoutError::Disconnected => Some(()),
            }),
            None => rx.recv().map_err(|_| Some(())),
        };
        match received {
            Ok(result) => result,
            Err(Some(())) => Err(CasefileError::EditCancelled {
                table: table.to_string(),
                row,
            }),
            Err(None) => {
                self.cancel_edit_lock()?;
                Err(CasefileError::LockTimeout {
                    path: self.lock_path(table, row).display().to_string(),
                })
            }
        }
    }

    /// Starts waiting for the edit lock without blocking; `on_acquired` runs on
    /// the worker thread once the lock is taken. The wait ends with
    /// [`EditLockManager::cancel_edit_lock`], a newer request or drop.
    pub fn begin_edit_lock<F>(&self, table: Table, row: i64, on_acquired: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.start(table, row, on_acquired).map(|_| ())
    }

    fn start<F>(&self, table: Table, row: i64, on_acquired: F) -> Result<Receiver<Result<()>>>
    where
        F: FnOnce() + Send + 'static,
    {
        let key = EditKey { table, row };
        let path = self.dir.join(key.file_name());
        fs::create_dir_all(&self.dir)?;
        let (tx, rx) = mpsc::channel();
        let mut pending = self.pending()?;
        if let Some(previous) = pending.take() {
            if previous.join.is_finished() {
                let _ = previous.join.join();
            } else {
                let earlier = previous.key;
                debug!(table = %earlier.table, row = earlier.row, "abandoning earlier edit request");
                if previous.stop() == EditOutcome::Acquired {
                    remove(&self.dir.join(earlier.file_name()), &earlier);
                }
            }
        }
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let poll = self.poll;
        let join = thread::Builder::new()
            .name(format!("edit-lock-{table}-{row}"))
            .spawn(move || {
                let outcome = wait_and_acquire(&path, key, poll, &worker_cancel, on_acquired, &tx);
                debug!(table = %key.table, row = key.row, ?outcome, "edit lock wait finished");
                outcome
            })?;
        *pending = Some(PendingEdit { key, cancel, join });
        Ok(rx)
    }

    /// Cancels the current request. A lock it already took is released.
    pub fn cancel_edit_lock(&self) -> Result<Option<EditOutcome>> {
        let Some(pending) = self.pending()?.take() else {
            return Ok(None);
        };
        let key = pending.key;
        let outcome = pending.stop();
        if outcome == EditOutcome::Acquired {
            remove(&self.dir.join(key.file_name()), &key);
        }
        info!(table = %key.table, row = key.row, ?outcome, "edit lock request cancelled");
        Ok(Some(outcome))
    }

    /// Removes the lock file for `(table, row)`; false when there was none.
    pub fn release_edit_lock(&self, table: Table, row: i64) -> Result<bool> {
        let key = EditKey { table, row };
        let previous = {
            let mut pending = self.pending()?;
            match pending.take() {
                Some(edit) if edit.key == key => Some(edit),
                other => {
                    *pending = other;
                    None
                }
            }
        };
        if let Some(edit) = previous {
            edit.stop();
        }
        Ok(remove(&self.dir.join(key.file_name()), &key))
    }
}

// A wait still in progress is cancelled. A lock already taken stays with
// whoever is editing; the worker itself removes one it took after cancellation.
impl Drop for EditLockManager {
    fn drop(&mut self) {
        let Ok(pending) = self.pending.get_mut() else {
            return;
        };
        if let Some(edit) = pending.take() {
            let key = edit.key;
            if !edit.join.is_finished() {
                let outcome = edit.stop();
                debug!(table = %key.table, row = key.row, ?outcome, "edit lock request dropped");
            }
        }
    }
}

fn remove(path: &Path, key: &EditKey) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(table = %key.table, row = key.row, "edit lock released");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(table = %key.table, row = key.row, "no edit lock to release");
            false
        }
        Err(e) => {
            warn!(table = %key.table, row = key.row, error = %e, "could not remove edit lock");
            false
        }
    }
}

fn wait_and_acquire<F>(
    path: &Path,
    key: EditKey,
    poll: Duration,
    cancel: &CancelToken,
    on_acquired: F,
    tx: &mpsc::Sender<Result<()>>,
) -> EditOutcome
where
    F: FnOnce(),
{
    loop {
        if cancel.is_cancelled() {
            return EditOutcome::Cancelled;
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let line = format!("Editing {} where ID is {}\n", key.table, key.row);
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!(path = %path.display(), error = %e, "could not describe edit lock");
                }
                if cancel.is_cancelled() {
                    remove(path, &key);
                    return EditOutcome::Cancelled;
                }
                on_acquired();
                let _ = tx.send(Ok(()));
                return EditOutcome::Acquired;
            }
            Err(e) if marker_busy(&e, path) => {
                if !cancel.sleep(poll) {
                    return EditOutcome::Cancelled;
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "edit lock could not be created");
                let _ = tx.send(Err(e.into()));
                return EditOutcome::Failed;
            }
        }
    }
}
