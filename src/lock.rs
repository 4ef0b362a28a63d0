//! Cross-process write exclusion and read marking through marker files.
//!
//! Every process sharing the data directory agrees on two files. The write
//! marker is created with create-new semantics, so exactly one process can
//! hold it; it is removed when the [`WriteGuard`] drops, on every exit path.
//! Readers wait until no write marker exists and then append one byte to the
//! read marker on entry and one on exit. Readers do not exclude each other,
//! and a writer arriving after a reader passed the gate is not held back.
//!
//! A process that dies while holding the write marker leaves it behind. Such a
//! stale marker blocks every other process until it is removed by hand, or
//! until a configured timeout turns the wait into [`CasefileError::LockTimeout`].

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{CasefileError, Result};

#[derive(Debug, Clone)]
pub struct LockCoordinator {
    write_marker: PathBuf,
    read_marker: PathBuf,
    poll: Duration,
    timeout: Option<Duration>,
}

impl LockCoordinator {
    pub fn new(write_marker: impl Into<PathBuf>, read_marker: impl Into<PathBuf>) -> Self {
        Self {
            write_marker: write_marker.into(),
            read_marker: read_marker.into(),
            poll: Duration::from_millis(100),
            timeout: None,
        }
    }
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.write_lock_path(), settings.read_lock_path())
            .with_poll_interval(settings.lock_poll())
            .with_timeout(settings.lock_timeout())
    }
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
    pub fn write_marker(&self) -> &Path {
        &self.write_marker
    }
    pub fn read_marker(&self) -> &Path {
        &self.read_marker
    }
    pub fn is_write_held(&self) -> bool {
        self.write_marker.exists()
    }
    /// Content of the write marker: the holder's pid and when it took the lock.
    pub fn write_holder(&self) -> Option<String> {
        fs::read_to_string(&self.write_marker).ok()
    }

    /// Blocks until this caller owns the write marker.
    pub fn acquire_write(&self) -> Result<WriteGuard> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut waited = false;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.write_marker)
            {
                Ok(mut file) => {
                    let stamp = format!("{} {}\n", std::process::id(), Utc::now().to_rfc3339());
                    if let Err(e) = file.write_all(stamp.as_bytes()) {
                        warn!(path = %self.write_marker.display(), error = %e, "could not stamp write marker");
                    }
                    if waited {
                        debug!(path = %self.write_marker.display(), "write lock acquired after waiting");
                    }
                    return Ok(WriteGuard {
                        marker: self.write_marker.clone(),
                    });
                }
                Err(e) if marker_busy(&e, &self.write_marker) => {
                    if !waited {
                        debug!(path = %self.write_marker.display(), holder = ?self.write_holder(), "waiting for write lock");
                        waited = true;
                    }
                    self.pause(deadline, &self.write_marker)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Waits out any writer, then marks the read.
    pub fn acquire_read(&self) -> Result<ReadGuard> {
        self.wait_for_clearance()?;
        mark(&self.read_marker)?;
        Ok(ReadGuard {
            marker: self.read_marker.clone(),
        })
    }

    /// Blocks while a write marker exists.
    pub fn wait_for_clearance(&self) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        while self.is_write_held() {
            self.pause(deadline, &self.write_marker)?;
        }
        Ok(())
    }

    fn pause(&self, deadline: Option<Instant>, path: &Path) -> Result<()> {
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(CasefileError::LockTimeout {
                    path: path.display().to_string(),
                });
            }
            thread::sleep(self.poll.min(deadline - now));
        } else {
            thread::sleep(self.poll);
        }
        Ok(())
    }
}

/// Whether a failed create-new of `marker` means another holder has it.
/// Windows reports a marker pending deletion as permission denied; anywhere
/// else, and without a marker on disk, that error is a real I/O failure.
pub fn marker_busy(error: &io::Error, marker: &Path) -> bool {
    match error.kind() {
        ErrorKind::AlreadyExists => true,
        ErrorKind::PermissionDenied => marker.exists(),
        _ => false,
    }
}

fn mark(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(b" ")?;
    Ok(())
}

/// Holds the write marker until dropped.
#[derive(Debug)]
pub struct WriteGuard {
    marker: PathBuf,
}

impl WriteGuard {
    pub fn marker(&self) -> &Path {
        &self.marker
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.marker) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.marker.display(), "write marker already gone on release");
            }
            Err(e) => warn!(path = %self.marker.display(), error = %e, "could not remove write marker"),
        }
    }
}

/// Marks the end of a read when dropped.
#[derive(Debug)]
pub struct ReadGuard {
    marker: PathBuf,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        if let Err(e) = mark(&self.marker) {
            warn!(path = %self.marker.display(), error = %e, "could not mark end of read");
        }
    }
}
