//! Error types for the mailtools-spool crate.

use std::{error::Error as StdError, io, path::PathBuf};

use mailtools_common::RecipientError;
use thiserror::Error;

/// Boxed error returned by a spool handler.
pub type HandlerError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O operation failed (list/read/write/rename/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A queue file lacks its required structure.
    #[error("Malformed queue file: {reason}")]
    MalformedQueueFile { reason: String },

    /// Spool directory validation failed.
    #[error("Spool validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A handler failed; the entry has already been deferred or
    /// dead-lettered by the time this is returned.
    #[error("Handler failed for spool entry {entry}: {source}")]
    Handler {
        entry: String,
        #[source]
        source: HandlerError,
    },

    /// Recipients could not be read back while serialising a message.
    #[error("Recipient error: {0}")]
    Recipient(#[from] RecipientError),

    /// A name that is not a valid spool entry name.
    #[error("Invalid spool entry name: {0}")]
    InvalidEntryName(String),

    /// No entry of that name exists.
    #[error("Spool entry not found: {0}")]
    NotFound(String),
}

impl SpoolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedQueueFile {
            reason: reason.into(),
        }
    }
}

/// Spool directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Spool path cannot contain '..' components: {}", .0.display())]
    ParentDirectory(PathBuf),

    #[error("Spool path must be absolute: {}", .0.display())]
    NotAbsolute(PathBuf),

    #[error("Spool path cannot be in system directory {prefix}: {}", .path.display())]
    SystemDirectory { prefix: &'static str, path: PathBuf },

    #[error("Expected {} to be a directory, but it is not", .0.display())]
    NotDirectory(PathBuf),

    #[error("Spool and dead-letter directories must differ: {}", .0.display())]
    SameDirectory(PathBuf),
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let spool_err: SpoolError = io_err.into();
        assert!(matches!(spool_err, SpoolError::Io(_)));
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = SpoolError::Handler {
            entry: "1700000000.00001.new".to_string(),
            source: "connection refused".into(),
        };

        assert_eq!(
            err.to_string(),
            "Handler failed for spool entry 1700000000.00001.new: connection refused"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_validation_message() {
        let err = SpoolError::from(ValidationError::NotAbsolute(PathBuf::from("spool")));
        assert!(err.to_string().contains("must be absolute"));
    }
}
