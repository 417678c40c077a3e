//! SQLite storage bootstrap, schema migrations and the process-wide handle.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the to-do core.
//! - Apply schema migrations in deterministic order.
//! - Own the lazily created, shared store instance.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write tasks before migrations succeed.
//! - At most one shared store instance is open per process.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod instance;
pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The shared instance is already bound to another database file.
    InstanceConflict {
        active: PathBuf,
        requested: PathBuf,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InstanceConflict { active, requested } => write!(
                f,
                "database already open at `{}`; refusing to switch to `{}`",
                active.display(),
                requested.display()
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::InstanceConflict { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
