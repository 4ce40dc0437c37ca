//! Error types for purge operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`PurgeError`] as the error type.
pub type Result<T> = std::result::Result<T, PurgeError>;

/// Errors reported by a [`RegistryGateway`](crate::RegistryGateway).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The registry rejected the credentials.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message.
        message: String,
    },

    /// Tag, manifest or repository does not exist.
    #[error("Not found: {repository}:{reference}")]
    NotFound {
        /// Repository name.
        repository: String,
        /// Tag or digest.
        reference: String,
    },

    /// Manifest deletion was refused.
    #[error("Failed to delete {repository}@{digest}: {message}")]
    Delete {
        /// Repository name.
        repository: String,
        /// Manifest digest.
        digest: String,
        /// Error message.
        message: String,
    },

    /// The call did not complete in time.
    #[error("Timed out after {timeout:?} during {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// Any other transport or protocol failure.
    #[error("Registry request failed: {message}")]
    Transport {
        /// Error message.
        message: String,
    },
}

impl GatewayError {
    /// Returns true if the error must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns true if the referenced object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that abort a purge run.
#[derive(Debug, Error)]
pub enum PurgeError {
    /// Authentication failed; nothing further can be done.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message.
        message: String,
    },

    /// The repository catalog could not be listed.
    #[error("Failed to list repositories: {source}")]
    Catalog {
        /// Underlying error.
        #[source]
        source: GatewayError,
    },

    /// Repository filter is not a valid regular expression.
    #[error("Invalid repository pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as given.
        pattern: String,
        /// Underlying error.
        #[source]
        source: regex::Error,
    },

    /// Keep list could not be loaded.
    #[error(transparent)]
    KeepList(#[from] KeepListError),
}

impl PurgeError {
    /// Converts a fatal gateway error into a run-level error.
    pub(crate) fn from_fatal(err: GatewayError) -> Self {
        match err {
            GatewayError::Authentication { message } => Self::Authentication { message },
            other => Self::Catalog { source: other },
        }
    }
}

/// Errors loading a keep list.
#[derive(Debug, Error)]
pub enum KeepListError {
    /// Keep list file could not be read.
    #[error("Failed to read keep list {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A line is not a valid rule.
    #[error("Invalid keep list line {line}: '{content}' ({reason})")]
    InvalidLine {
        /// 1-based line number.
        line: usize,
        /// Offending line, comment stripped.
        content: String,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = GatewayError::NotFound {
            repository: "team/api".to_string(),
            reference: "v1.2.0".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: team/api:v1.2.0");
        assert!(err.is_not_found());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_display_delete() {
        let err = GatewayError::Delete {
            repository: "team/api".to_string(),
            digest: "sha256:abc".to_string(),
            message: "deletion disabled".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to delete team/api@sha256:abc: deletion disabled"
        );
    }

    #[test]
    fn test_authentication_is_fatal() {
        let err = GatewayError::Authentication {
            message: "invalid token".to_string(),
        };
        assert!(err.is_fatal());

        let purge = PurgeError::from_fatal(err);
        assert_eq!(purge.to_string(), "Authentication failed: invalid token");
    }

    #[test]
    fn test_keep_list_error_display() {
        let err = KeepListError::InvalidLine {
            line: 3,
            content: "*:*".to_string(),
            reason: "would keep everything".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid keep list line 3: '*:*' (would keep everything)"
        );
    }
}
