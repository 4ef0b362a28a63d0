use thiserror::Error;

#[derive(Error, Debug)]
pub enum CasefileError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Unknown group: {0}")]
    UnknownGroup(String),
    #[error("Unknown column '{column}' in group {group}")]
    UnknownColumn { group: String, column: String },
    #[error("Attribute {attribute} is not allowed for {entity}")]
    UnknownAttribute { entity: String, attribute: String },
    #[error("Invalid value for {attribute}: {message}")]
    InvalidValue { attribute: String, message: String },
    #[error("No join path from {from} to {to}")]
    UnsupportedJoin { from: String, to: String },
    #[error("Restricted search rejected: {0}")]
    Restricted(String),
    #[error("No row {nb} in {table}")]
    NotFound { table: String, nb: i64 },
    #[error("Timed out waiting for lock {path}")]
    LockTimeout { path: String },
    #[error("Edit of {table} row {row} was cancelled")]
    EditCancelled { table: String, row: i64 },
    #[error("Change log append failed after {attempts} attempts: {message}")]
    ChangeLog { attempts: u32, message: String },
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, CasefileError>;

// Helper conversions
impl From<rusqlite::Error> for CasefileError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}

impl From<std::io::Error> for CasefileError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}

impl From<::config::ConfigError> for CasefileError {
    fn from(e: ::config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
