//! Centralized error types for mailmerge.
//!
//! Two tiers: [`MergeError`] aborts a whole run, [`RowError`] is recorded on a
//! single row and the run moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors produced by the mailmerge library.
#[derive(Error, Debug)]
pub enum MergeError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The recipient list could not be read as a table.
    #[error("Invalid recipient list '{path}': {reason}")]
    InvalidRowStore { path: PathBuf, reason: String },

    /// The draft could not be found or parsed.
    #[error("Draft '{id}' unavailable: {reason}")]
    Draft { id: String, reason: String },

    /// The checkpoint file is unreadable or corrupt.
    #[error("Corrupt checkpoint '{path}': {reason}")]
    InvalidCheckpoint { path: PathBuf, reason: String },

    /// A placeholder pattern could not be compiled.
    #[error("Invalid placeholder for column '{header}': {source}")]
    Pattern {
        header: String,
        source: regex::Error,
    },

    /// A row index outside the recipient list was addressed.
    #[error("Row {0} is outside the recipient list")]
    RowOutOfRange(usize),

    /// The transport could not be set up.
    #[error("Transport setup failed: {0}")]
    TransportSetup(String),

    /// A configuration value is missing or unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MergeError>`.
pub type Result<T> = std::result::Result<T, MergeError>;

impl MergeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a read error to `FileNotFound` when the file is missing.
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Which stage of a row's processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowErrorKind {
    /// Subject or body could not be personalized.
    Personalization,
    /// The attachment flag could not be evaluated.
    AttachmentPolicy,
    /// The message could not be assembled (bad address, bad MIME type).
    Compose,
    /// The transport rejected or failed to deliver the message.
    Transport,
}

/// A recoverable failure confined to one row.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct RowError {
    pub kind: RowErrorKind,
    pub message: String,
}

impl RowError {
    pub fn new(kind: RowErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failure reported by a transport collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The message could not be rendered (bad address, bad MIME type).
    #[error("invalid message: {0}")]
    Compose(String),

    /// The message was rendered but not delivered.
    #[error("{transport}: {reason}")]
    Delivery {
        transport: &'static str,
        reason: String,
    },
}

impl From<TransportError> for RowError {
    fn from(err: TransportError) -> Self {
        let kind = match err {
            TransportError::Compose(_) => RowErrorKind::Compose,
            TransportError::Delivery { .. } => RowErrorKind::Transport,
        };
        RowError::new(kind, err.to_string())
    }
}
