//! Wire models shared by every endpoint
//!
//! [`ApiError`] is the standard error body returned by the backend for any
//! non-2xx response. [`SignOutResponse`] is the body of the sign-out endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured error returned by the server with a non-2xx status.
///
/// `meta_data` is kept as a JSON object so that equality is structural over
/// nested values.
///
/// # Examples
///
/// ```
/// use authlink::api::models::ApiError;
///
/// let body = r#"{"errorCode":10,"errorText":"bad_input","errorDisplay":"Bad input","success":false}"#;
/// let error: ApiError = serde_json::from_str(body).unwrap();
/// assert_eq!(error.error_code, 10);
/// assert!(error.meta_data.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Backend-specific numeric error code.
    pub error_code: i64,

    /// Machine-readable error text.
    pub error_text: String,

    /// Message suitable for display to an end user.
    #[serde(default)]
    pub error_display: String,

    /// Always `false` for error bodies.
    #[serde(default)]
    pub success: bool,

    /// Optional free-form metadata attached by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<Map<String, Value>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error_text, self.error_code, self.error_display)
    }
}

/// Body of the sign-out endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOutResponse {
    /// Whether the backend revoked the session.
    pub success: bool,
}
