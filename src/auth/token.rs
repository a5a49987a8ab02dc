//! Bearer token values
//!
//! [`Token`] is the immutable pair of access and refresh tokens owned by the
//! [`TokenAuthority`](super::authority::TokenAuthority). Every successful grant
//! produces a new `Token` that replaces the previous one wholesale.
//!
//! [`GrantResponse`] is the raw body returned by the identity endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The current access and refresh tokens.
///
/// Either field may be absent: a fresh install has neither, and a
/// client-credentials grant usually yields no refresh token.
///
/// # Examples
///
/// ```
/// use authlink::auth::token::Token;
///
/// let token = Token::default();
/// assert!(token.access_token.is_none());
/// assert!(token.refresh_token.is_none());
/// assert!(token.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer credential attached to API requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Credential exchanged for a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry derived from `expires_in`, informational only.
    ///
    /// The server remains the authority on validity; an expired token is
    /// still sent and refreshed on `401`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Creates a token from raw parts with no recorded expiry.
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: None,
        }
    }

    /// Returns `true` when neither an access nor a refresh token is held.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Raw JSON response from the identity endpoint.
///
/// # Examples
///
/// ```
/// use authlink::auth::token::{GrantResponse, Token};
///
/// let response: GrantResponse = serde_json::from_str(
///     r#"{"token_type":"Bearer","expires_in":3600,"access_token":"abc"}"#,
/// ).unwrap();
///
/// let token = Token::from(response);
/// assert_eq!(token.access_token.as_deref(), Some("abc"));
/// assert!(token.refresh_token.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantResponse {
    /// Token type, typically `"Bearer"`.
    pub token_type: String,

    /// Lifetime of the access token in seconds.
    pub expires_in: i64,

    /// The issued access token.
    pub access_token: String,

    /// The issued refresh token, if the grant type yields one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<GrantResponse> for Token {
    fn from(response: GrantResponse) -> Self {
        // Out-of-range lifetimes leave the expiry unknown
        let expires_at = (response.expires_in > 0)
            .then(|| chrono::Duration::try_seconds(response.expires_in))
            .flatten()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Token {
            access_token: Some(response.access_token),
            refresh_token: response.refresh_token,
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant_response(refresh: Option<&str>, expires_in: i64) -> GrantResponse {
        GrantResponse {
            token_type: "Bearer".to_string(),
            expires_in,
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
        }
    }

    #[test]
    fn test_token_from_grant_response_copies_tokens() {
        let token = Token::from(grant_response(Some("refresh"), 3600));
        assert_eq!(token.access_token.as_deref(), Some("access"));
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn test_token_from_grant_response_sets_expiry_in_future() {
        let token = Token::from(grant_response(None, 3600));
        let expires_at = token.expires_at.unwrap();
        assert!(expires_at > Utc::now() + chrono::Duration::seconds(3500));
    }

    #[test]
    fn test_token_from_grant_response_zero_lifetime_has_no_expiry() {
        let token = Token::from(grant_response(None, 0));
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn test_token_from_grant_response_huge_lifetime_has_no_expiry() {
        let token = Token::from(grant_response(Some("refresh"), i64::MAX));
        assert_eq!(token.access_token.as_deref(), Some("access"));
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn test_token_is_empty() {
        assert!(Token::default().is_empty());
        assert!(!Token::new(None, Some("r".to_string())).is_empty());
    }

    #[test]
    fn test_grant_response_without_refresh_token_decodes() {
        let json = r#"{"token_type":"Bearer","expires_in":60,"access_token":"a"}"#;
        let response: GrantResponse = serde_json::from_str(json).unwrap();
        assert!(response.refresh_token.is_none());
        assert_eq!(response.expires_in, 60);
    }
}
