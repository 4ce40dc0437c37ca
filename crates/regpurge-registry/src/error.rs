//! Error types for registry operations.

use std::path::PathBuf;
use std::time::Duration;

use regpurge_core::GatewayError;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Request exceeded the client timeout.
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Request URL.
        url: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Tag or manifest not found.
    #[error("Not found: {repository}:{reference}")]
    NotFound {
        /// Repository name.
        repository: String,
        /// Tag or digest.
        reference: String,
    },

    /// Repository not found.
    #[error("Repository not found: {repository}")]
    RepositoryNotFound {
        /// Repository name.
        repository: String,
    },

    /// The registry does not allow manifest deletion.
    #[error("Deletion is disabled on the registry (HTTP 405) for {repository}")]
    DeletionDisabled {
        /// Repository name.
        repository: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// Invalid TLS material.
    #[error("Invalid TLS configuration: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else if err.is_status() {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                status: 0,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AuthenticationFailed { message } => Self::Authentication { message },
            RegistryError::NotFound {
                repository,
                reference,
            } => Self::NotFound {
                repository,
                reference,
            },
            RegistryError::Timeout { url, timeout } => Self::Timeout {
                operation: format!("request to {url}"),
                timeout,
            },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl RegistryError {
    /// Converts a failed manifest deletion into a gateway error.
    ///
    /// Authentication, not-found and timeout errors keep their kind; any
    /// other failure becomes [`GatewayError::Delete`].
    #[must_use]
    pub fn into_delete_error(self, repository: &str, digest: &str) -> GatewayError {
        match self {
            Self::AuthenticationFailed { .. } | Self::NotFound { .. } | Self::Timeout { .. } => {
                self.into()
            }
            other => GatewayError::Delete {
                repository: repository.to_string(),
                digest: digest.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = RegistryError::NotFound {
            repository: "team/api".to_string(),
            reference: "v1.2.0".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: team/api:v1.2.0");
    }

    #[test]
    fn test_error_display_auth_failed() {
        let err = RegistryError::AuthenticationFailed {
            message: "invalid token".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: invalid token");
    }

    #[test]
    fn test_gateway_conversion() {
        let auth: GatewayError = RegistryError::AuthenticationFailed {
            message: "denied".to_string(),
        }
        .into();
        assert!(auth.is_fatal());

        let http: GatewayError = RegistryError::HttpError {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert_eq!(
            http,
            GatewayError::Transport {
                message: "HTTP error from registry: 500 - boom".to_string()
            }
        );
    }

    #[test]
    fn test_delete_conversion() {
        let disabled = RegistryError::DeletionDisabled {
            repository: "team/api".to_string(),
        }
        .into_delete_error("team/api", "sha256:abc");
        assert!(matches!(disabled, GatewayError::Delete { ref digest, .. } if digest == "sha256:abc"));

        let missing = RegistryError::NotFound {
            repository: "team/api".to_string(),
            reference: "sha256:abc".to_string(),
        }
        .into_delete_error("team/api", "sha256:abc");
        assert!(missing.is_not_found());
    }
}
