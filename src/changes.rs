//! The change log and the notifier that tails it.
//!
//! Each mutation appends one single-character marker per record group it
//! touched: a tab for the case tables, a newline for persons and a space for
//! documents. The log only grows; a reader keeps its own byte offset and is
//! handed the set of distinct markers written since its previous poll.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::edit::CancelToken;
use crate::error::{CasefileError, Result};
use crate::schema::Table;

lazy_static! {
    static ref INSERT_TARGET: Regex = Regex::new(r"(?i)INSERT\s+INTO\s+([^\s(]+)").unwrap();
    static ref UPDATE_TARGET: Regex = Regex::new(r"(?i)UPDATE\s+(\S+)").unwrap();
    static ref DELETE_TARGET: Regex = Regex::new(r"(?i)DELETE\s+FROM\s+(\S+)").unwrap();
}

/// The record collections a client refreshes when notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordGroup {
    Cases,
    Persons,
    Documents,
}

impl RecordGroup {
    pub const ALL: [RecordGroup; 3] = [RecordGroup::Cases, RecordGroup::Persons, RecordGroup::Documents];

    pub fn marker(self) -> u8 {
        match self {
            RecordGroup::Cases => b'\t',
            RecordGroup::Persons => b'\n',
            RecordGroup::Documents => b' ',
        }
    }
    pub fn from_marker(marker: u8) -> Option<Self> {
        RecordGroup::ALL.into_iter().find(|g| g.marker() == marker)
    }
    pub fn of_table(table: Table) -> Self {
        match table {
            Table::Cases | Table::CasePeople | Table::CaseDocuments => RecordGroup::Cases,
            Table::Persons => RecordGroup::Persons,
            Table::Documents => RecordGroup::Documents,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            RecordGroup::Cases => "cases",
            RecordGroup::Persons => "persons",
            RecordGroup::Documents => "documents",
        }
    }
}

impl fmt::Display for RecordGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names following `INSERT INTO`, `UPDATE` and `DELETE FROM`, first match of each.
pub fn affected_tables(sql: &str) -> Vec<&str> {
    let mut tables: Vec<&str> = [&*INSERT_TARGET, &*UPDATE_TARGET, &*DELETE_TARGET]
        .iter()
        .filter_map(|re| re.captures(sql))
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .collect();
    tables.dedup();
    tables
}

/// Record groups a statement mutates, in marker order.
pub fn classify(sql: &str) -> Vec<RecordGroup> {
    let groups: BTreeSet<RecordGroup> = affected_tables(sql)
        .into_iter()
        .filter_map(Table::from_name)
        .map(RecordGroup::of_table)
        .collect();
    groups.into_iter().collect()
}

/// Distinct groups seen in one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeSet<RecordGroup>);

impl ChangeSet {
    pub fn from_markers(bytes: &[u8]) -> Self {
        Self(bytes.iter().filter_map(|b| RecordGroup::from_marker(*b)).collect())
    }
    pub fn iter(&self) -> impl Iterator<Item = RecordGroup> + '_ {
        self.0.iter().copied()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn contains(&self, group: RecordGroup) -> bool {
        self.0.contains(&group)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(RecordGroup::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Append side of the log.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
    retry_limit: u32,
}

impl ChangeLog {
    pub fn new(path: impl Into<PathBuf>, retry_limit: u32) -> Self {
        Self {
            path: path.into(),
            retry_limit,
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Appends one marker per group. Permission errors, which another process
    /// briefly holding the file can cause, are retried up to the limit.
    pub fn append(&self, groups: &[RecordGroup]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }
        let markers: Vec<u8> = groups.iter().map(|g| g.marker()).collect();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .and_then(|mut file| file.write_all(&markers));
            match written {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::PermissionDenied && attempts <= self.retry_limit => {
                    warn!(path = %self.path.display(), attempts, "change log busy, retrying");
                }
                Err(e) => {
                    return Err(CasefileError::ChangeLog {
                        attempts,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Read side of the log with a private cursor.
#[derive(Debug)]
pub struct ChangeNotifier {
    path: PathBuf,
    offset: u64,
}

impl ChangeNotifier {
    /// Starts at the current end of the log, so only later changes are seen.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, offset }
    }
    pub fn from_start(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads what was appended since the previous poll.
    pub fn poll(&mut self) -> Result<ChangeSet> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.offset = 0;
                return Ok(ChangeSet::default());
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            debug!(path = %self.path.display(), len, offset = self.offset, "change log shrank, reading from start");
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut fresh = Vec::new();
        file.read_to_end(&mut fresh)?;
        self.offset += fresh.len() as u64;
        Ok(ChangeSet::from_markers(&fresh))
    }

    /// Polls on a background thread, sending non-empty change sets to subscribers.
    pub fn spawn(self, interval: Duration) -> Result<NotifierHandle> {
        let cancel = CancelToken::new();
        let subscribers: Arc<Mutex<Vec<Sender<ChangeSet>>>> = Arc::new(Mutex::new(Vec::new()));
        let worker_cancel = cancel.clone();
        let worker_subscribers = Arc::clone(&subscribers);
        let mut notifier = self;
        let join = thread::Builder::new()
            .name("change-notifier".into())
            .spawn(move || {
                while worker_cancel.sleep(interval) {
                    let changes = match notifier.poll() {
                        Ok(changes) => changes,
                        Err(e) => {
                            warn!(error = %e, "change log poll failed");
                            continue;
                        }
                    };
                    if changes.is_empty() {
                        continue;
                    }
                    debug!(%changes, "changes observed");
                    match worker_subscribers.lock() {
                        Ok(mut subscribers) => {
                            subscribers.retain(|tx| tx.send(changes.clone()).is_ok())
                        }
                        Err(e) => warn!(error = %e, "subscriber list poisoned"),
                    }
                }
            })?;
        Ok(NotifierHandle {
            cancel,
            subscribers,
            join: Some(join),
        })
    }
}

pub struct NotifierHandle {
    cancel: CancelToken,
    subscribers: Arc<Mutex<Vec<Sender<ChangeSet>>>>,
    join: Option<JoinHandle<()>>,
}

impl NotifierHandle {
    pub fn subscribe(&self) -> Result<Receiver<ChangeSet>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .map_err(|e| CasefileError::Lock(e.to_string()))?
            .push(tx);
        Ok(rx)
    }
    /// Stops polling and waits for the thread to end.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
