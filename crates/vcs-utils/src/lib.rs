//! Foundation utilities shared by the vcs storage crates: dates and
//! identities, the lock-file protocol, the advisory lock manager, and the
//! cancellation signal.

pub mod abort;
pub mod date;
pub mod lock;
pub mod lockfile;

use std::path::PathBuf;

/// Errors produced by the utility layer.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("date parse error: {0}")]
    DateParse(String),

    #[error("signature parse error: {0}")]
    SignatureParse(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced by lock-file operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("already locked: {path}")]
    AlreadyLocked { path: PathBuf },

    #[error("cannot create lock file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot commit lock file {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, UtilError>;
