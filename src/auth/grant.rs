//! Grant requests sent to the identity endpoint
//!
//! A [`GrantRequest`] is built fresh for each refresh or sign-in attempt and
//! serialized into the JSON body of `POST {token_url}`. Caller-supplied extra
//! parameters are merged last and win on key collision.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default scope requested by client-credentials, password, and custom grants.
pub const DEFAULT_SCOPE: &str = "*";

/// OAuth2-style grant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Anonymous application-level token.
    ClientCredentials,
    /// Exchange of a stored refresh token.
    RefreshToken,
    /// Username and password sign-in.
    Password,
    /// Sign-in through a named external provider.
    CustomRequest,
}

impl GrantType {
    /// Wire value of the `grant_type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
            GrantType::Password => "password",
            GrantType::CustomRequest => "custom_request",
        }
    }
}

/// Application credentials registered with the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Scope sent with grants that carry one.
    pub scope: String,
}

impl ClientCredentials {
    /// Creates credentials with the default `*` scope.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }
}

/// A single grant request.
///
/// # Examples
///
/// ```
/// use authlink::auth::grant::{ClientCredentials, GrantRequest};
///
/// let credentials = ClientCredentials::new("app", "secret");
/// let body = GrantRequest::refresh_token(&credentials, "r1").to_body();
///
/// assert_eq!(body["grant_type"], "refresh_token");
/// assert_eq!(body["refresh_token"], "r1");
/// assert!(body.get("scope").is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRequest {
    /// Requested grant type.
    pub grant_type: GrantType,
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Requested scope; omitted for refresh-token grants.
    pub scope: Option<String>,
    /// Refresh token; only for refresh-token grants.
    pub refresh_token: Option<String>,
    /// External provider name; only for custom-request grants.
    pub provider: Option<String>,
    /// Caller-supplied fields merged over the defaults.
    pub extra: Map<String, Value>,
}

impl GrantRequest {
    fn base(grant_type: GrantType, credentials: &ClientCredentials, scoped: bool) -> Self {
        Self {
            grant_type,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            scope: scoped.then(|| credentials.scope.clone()),
            refresh_token: None,
            provider: None,
            extra: Map::new(),
        }
    }

    /// Anonymous client-credentials grant.
    pub fn client_credentials(credentials: &ClientCredentials) -> Self {
        Self::base(GrantType::ClientCredentials, credentials, true)
    }

    /// Refresh-token grant for the given token.
    pub fn refresh_token(credentials: &ClientCredentials, refresh_token: &str) -> Self {
        let mut request = Self::base(GrantType::RefreshToken, credentials, false);
        request.refresh_token = Some(refresh_token.to_string());
        request
    }

    /// Sign-in grant: `custom_request` when a provider is named, `password`
    /// otherwise.
    pub fn sign_in(credentials: &ClientCredentials, provider: Option<&str>) -> Self {
        match provider {
            Some(provider) => {
                let mut request = Self::base(GrantType::CustomRequest, credentials, true);
                request.provider = Some(provider.to_string());
                request
            }
            None => Self::base(GrantType::Password, credentials, true),
        }
    }

    /// Merges caller parameters into the request; they override defaults.
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.extra.extend(parameters);
        self
    }

    /// Builds the JSON body sent to the identity endpoint.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("client_id".into(), Value::from(self.client_id.clone()));
        body.insert("client_secret".into(), Value::from(self.client_secret.clone()));
        body.insert("grant_type".into(), Value::from(self.grant_type.as_str()));
        if let Some(scope) = &self.scope {
            body.insert("scope".into(), Value::from(scope.clone()));
        }
        if let Some(refresh_token) = &self.refresh_token {
            body.insert("refresh_token".into(), Value::from(refresh_token.clone()));
        }
        if let Some(provider) = &self.provider {
            body.insert("provider".into(), Value::from(provider.clone()));
        }
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        body
    }
}
