//! Settings for the store, its marker files and the polling intervals.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `CASEFILE_*` environment variables (`CASEFILE_DATA_DIR=/srv/register`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub write_lock_file: String,
    pub read_lock_file: String,
    pub changes_log_file: String,
    pub edit_lock_dir: String,
    pub lock_poll_ms: u64,
    pub lock_timeout_ms: Option<u64>,
    pub edit_poll_ms: u64,
    pub edit_timeout_ms: Option<u64>,
    pub change_poll_ms: u64,
    pub changelog_retry_limit: u32,
    pub listen: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_file: "primary.db".into(),
            write_lock_file: "write.lock".into(),
            read_lock_file: "read.lock".into(),
            changes_log_file: "changes_log.json".into(),
            edit_lock_dir: "edit_locks".into(),
            lock_poll_ms: 100,
            lock_timeout_ms: None,
            edit_poll_ms: 1000,
            edit_timeout_ms: None,
            change_poll_ms: 1000,
            changelog_retry_limit: 64,
            listen: "127.0.0.1:8080".into(),
        }
    }
}

impl Settings {
    /// Reads `path` when it exists and applies environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("CASEFILE"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
    /// Defaults with every file placed under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
    pub fn write_lock_path(&self) -> PathBuf {
        self.data_dir.join(&self.write_lock_file)
    }
    pub fn read_lock_path(&self) -> PathBuf {
        self.data_dir.join(&self.read_lock_file)
    }
    pub fn changes_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.changes_log_file)
    }
    pub fn edit_lock_path(&self) -> PathBuf {
        self.data_dir.join(&self.edit_lock_dir)
    }
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
    pub fn edit_poll(&self) -> Duration {
        Duration::from_millis(self.edit_poll_ms)
    }
    pub fn edit_timeout(&self) -> Option<Duration> {
        self.edit_timeout_ms.map(Duration::from_millis)
    }
    pub fn change_poll(&self) -> Duration {
        Duration::from_millis(self.change_poll_ms)
    }
}
