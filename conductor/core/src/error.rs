//! Error Types
//!
//! Every failure a send can hit falls into one of three kinds:
//!
//! - [`ValidationError`]: rejected before any I/O, nothing mutated
//! - [`ConfigError`]: bad endpoint or configuration data
//! - [`TransportError`]: the request or its response stream failed
//!
//! [`SendError`] unifies them so the Conductor can catch everything at one
//! boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Preconditions for starting a send were not met
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Prompt was empty or whitespace only
    #[error("Prompt is empty")]
    EmptyPrompt,

    /// Another exchange is still in flight
    #[error("A request is already in progress")]
    SendInProgress,

    /// Remote mode without a bearer token
    #[error("Remote mode requires an access token")]
    MissingToken,

    /// Remote mode without a resource identifier
    #[error("Remote mode requires an agent resource identifier")]
    MissingResourceId,
}

/// Configuration could not be loaded, saved, or interpreted
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Resource identifier does not have the expected colon-delimited shape
    #[error("Malformed resource identifier '{resource_id}': {reason}")]
    MalformedResourceId {
        /// The identifier as supplied
        resource_id: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// A required endpoint field was absent at resolution time
    #[error("Missing endpoint setting: {0}")]
    MissingField(&'static str),

    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to write config file
    #[error("Failed to write config file at {path}: {source}")]
    WriteError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("Failed to serialize TOML config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// The request could not be issued or its stream broke
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint answered with a non-success status
    #[error("Request failed with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if any was readable
        body: String,
    },

    /// Connection or request-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The body stream failed after it had started
    #[error("Stream read failed: {0}")]
    StreamRead(String),

    /// The backend went away without signalling completion
    #[error("Response stream closed unexpectedly")]
    StreamClosed,

    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            Self::StreamRead(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Any failure surfaced by a send
#[derive(Debug, Error)]
pub enum SendError {
    /// Rejected before any I/O
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Request construction failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Request or stream failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SendError {
    /// Whether this failure happened before anything was mutated
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed with status 502");
    }

    #[test]
    fn test_send_error_is_transparent() {
        let err: SendError = ValidationError::SendInProgress.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "A request is already in progress");

        let err: SendError = TransportError::StreamClosed.into();
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "Response stream closed unexpectedly");
    }

    #[test]
    fn test_malformed_resource_id_message() {
        let err = ConfigError::MalformedResourceId {
            resource_id: "arn:aws".to_string(),
            reason: "expected at least 4 colon-delimited segments",
        };
        assert!(err.to_string().contains("arn:aws"));
    }
}
