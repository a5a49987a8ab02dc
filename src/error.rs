//! Error types for Authlink
//!
//! This module defines the error taxonomy surfaced by the token authority and
//! the request pipeline, using `thiserror` for ergonomic error handling.
//!
//! Errors are `Clone` because a single refresh outcome is handed to every
//! caller attached to the in-flight refresh.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::api::models::ApiError;

/// Main error type for Authlink operations
#[derive(Error, Debug, Clone)]
pub enum AuthlinkError {
    /// The endpoint path cannot be combined with the base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request body parameters could not be serialized to JSON
    #[error("Parameter encoding error: {0}")]
    ParameterEncoding(String),

    /// No HTTP response was obtained (DNS, connection, timeout)
    #[error("Transport error: {0}")]
    Transport(Arc<reqwest::Error>),

    /// Structured error body returned by the server with a non-2xx status
    #[error("API error: {0}")]
    Api(ApiError),

    /// A response body could not be decoded into the expected type
    #[error("Decoding error: {0}")]
    Decoding(DecodingError),

    /// An authentication failure recurred right after a refresh and retry
    #[error("Authentication failed again after token refresh: status={status}")]
    AuthExhausted {
        /// Status code of the second authentication failure
        status: u16,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared refresh task ended without producing an outcome
    #[error("Token refresh aborted: {0}")]
    RefreshAborted(String),
}

impl AuthlinkError {
    /// Returns the decoded [`ApiError`] when this is an API error.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            AuthlinkError::Api(error) => Some(error),
            _ => None,
        }
    }

    /// Returns `true` for failures where no HTTP response was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, AuthlinkError::Transport(_))
    }

    /// Returns `true` when the transport failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            AuthlinkError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AuthlinkError {
    fn from(error: reqwest::Error) -> Self {
        AuthlinkError::Transport(Arc::new(error))
    }
}

impl From<DecodingError> for AuthlinkError {
    fn from(error: DecodingError) -> Self {
        AuthlinkError::Decoding(error)
    }
}

impl From<ApiError> for AuthlinkError {
    fn from(error: ApiError) -> Self {
        AuthlinkError::Api(error)
    }
}

/// Result type alias for Authlink operations
pub type Result<T> = std::result::Result<T, AuthlinkError>;

/// The kind of failure encountered while decoding a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodingErrorKind {
    /// The body is not valid JSON (syntax error or unexpected end of input).
    Corrupted,
    /// A required key is missing from an object.
    KeyNotFound(String),
    /// A non-optional value is `null`.
    ValueNotFound,
    /// A value has a different type than expected.
    TypeMismatch,
}

impl fmt::Display for DecodingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodingErrorKind::Corrupted => write!(f, "corrupted data"),
            DecodingErrorKind::KeyNotFound(key) => write!(f, "key not found `{}`", key),
            DecodingErrorKind::ValueNotFound => write!(f, "value not found"),
            DecodingErrorKind::TypeMismatch => write!(f, "type mismatch"),
        }
    }
}

/// Detailed description of a JSON decoding failure.
///
/// Carries the failure kind, the coding path at which it occurred (`.` for the
/// document root), and the underlying parser's debug description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodingError {
    /// What went wrong.
    pub kind: DecodingErrorKind,
    /// Dotted coding path of the offending value, e.g. `items[2].name`.
    pub path: String,
    /// Parser diagnostic, including line and column.
    pub description: String,
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at path '{}': {}",
            self.kind, self.path, self.description
        )
    }
}

impl std::error::Error for DecodingError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_api_error() -> ApiError {
        ApiError {
            error_code: 10,
            error_text: "bad_input".to_string(),
            error_display: "Bad input".to_string(),
            success: false,
            meta_data: None,
        }
    }

    #[test]
    fn test_invalid_url_error_display() {
        let error = AuthlinkError::InvalidUrl("::nope".to_string());
        assert_eq!(error.to_string(), "Invalid URL: ::nope");
    }

    #[test]
    fn test_config_error_display() {
        let error = AuthlinkError::Config("missing client_id".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing client_id");
    }

    #[test]
    fn test_auth_exhausted_display_includes_status() {
        let error = AuthlinkError::AuthExhausted { status: 401 };
        assert!(error.to_string().contains("status=401"));
    }

    #[test]
    fn test_api_error_accessor() {
        let error = AuthlinkError::from(sample_api_error());
        assert_eq!(error.api_error().map(|e| e.error_code), Some(10));
        assert!(!error.is_transport());
        assert!(!error.is_timeout());
    }

    #[test]
    fn test_decoding_error_display_names_kind_and_path() {
        let error = DecodingError {
            kind: DecodingErrorKind::KeyNotFound("name".to_string()),
            path: ".".to_string(),
            description: "missing field `name` at line 1 column 8".to_string(),
        };
        let msg = AuthlinkError::from(error).to_string();
        assert!(msg.contains("key not found `name`"), "{msg}");
        assert!(msg.contains("path '.'"), "{msg}");
        assert!(msg.contains("line 1 column 8"), "{msg}");
    }

    #[test]
    fn test_decoding_kind_display() {
        assert_eq!(DecodingErrorKind::Corrupted.to_string(), "corrupted data");
        assert_eq!(DecodingErrorKind::ValueNotFound.to_string(), "value not found");
        assert_eq!(DecodingErrorKind::TypeMismatch.to_string(), "type mismatch");
    }

    #[test]
    fn test_error_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<AuthlinkError>();
    }
}
