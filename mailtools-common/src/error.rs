//! Error types for recipient parsing and collection.

use std::io;

use thiserror::Error;

use crate::address::AddressError;

/// Errors raised while turning raw input into recipients.
#[derive(Debug, Error)]
pub enum RecipientError {
    /// The token could not be read as any accepted recipient shape.
    #[error("Malformed recipient {token:?}: {reason}")]
    MalformedRecipient { token: String, reason: String },

    /// The address part failed normalisation.
    #[error("Invalid address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    /// Reading input or the spill store failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Merge data could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecipientError {
    pub(crate) fn malformed(token: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecipient {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error comes from the input itself rather
    /// than from the machinery storing it.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecipient { .. } | Self::InvalidAddress { .. }
        )
    }
}

/// Specialized `Result` type for recipient operations.
pub type Result<T> = std::result::Result<T, RecipientError>;

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = RecipientError::malformed("", "empty token");
        assert_eq!(err.to_string(), "Malformed recipient \"\": empty token");
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_invalid_address_keeps_source() {
        let err = RecipientError::InvalidAddress {
            address: "nobody".to_string(),
            source: AddressError::MissingAtSign,
        };
        assert!(err.source().is_some());
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: RecipientError = io::Error::other("disk full").into();
        assert!(matches!(err, RecipientError::Io(_)));
        assert!(!err.is_parse_error());
    }
}
