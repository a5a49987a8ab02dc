//! Authenticated request pipeline
//!
//! [`ApiClient`] turns an [`Endpoint`] into an HTTP exchange carrying the
//! current bearer token, recovers from one authentication failure by
//! refreshing the token and retrying, and decodes the result.
//!
//! # Attempt state machine
//!
//! ```text
//! Sending --2xx--------------------------------------> Success
//!    |  \--401, or 400 with refresh token (1st time)--> AuthRetryPending --> Sending
//!    \----other status / 2nd auth failure / transport--> FinalError
//! ```
//!
//! [`RequestContext::prior_status_code`] records the status that triggered
//! the refresh. Once it is set, no further refresh happens for that call, so
//! `AuthRetryPending` is entered at most once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::api::decode::{decode_api_error, decode_json, DateDecodingStrategy};
use crate::api::endpoint::Endpoint;
use crate::api::events::{ErrorEvent, ErrorEventCollector, TracingErrorCollector};
use crate::api::transport::{self, Bearer, PreparedRequest, RawResponse};
use crate::auth::authority::TokenAuthority;
use crate::auth::credential_store::{
    CredentialStore, InMemoryCredentialStore, KeyringCredentialStore,
};
use crate::auth::token::Token;
use crate::config::{Config, CredentialBackend};
use crate::error::{AuthlinkError, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call state carried from the first attempt to the retry.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identifier shared by the tracing span and any error event.
    pub request_id: Uuid,
    /// Status of the attempt that triggered a refresh, if one did.
    pub prior_status_code: Option<u16>,
    request: PreparedRequest,
}

impl RequestContext {
    fn new(request: PreparedRequest) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            prior_status_code: None,
            request,
        }
    }

    /// `401` always signals an authentication failure; `400` does only while
    /// a refresh token is held.
    pub fn is_auth_failure(status: u16, token: &Token) -> bool {
        status == 401 || (status == 400 && token.refresh_token.is_some())
    }

    /// Whether this attempt should trigger the single refresh-and-retry.
    ///
    /// Any auth failure after a retry is final, even when its status differs
    /// from the one that triggered the refresh.
    pub fn should_refresh(&self, status: u16, token: &Token) -> bool {
        Self::is_auth_failure(status, token) && self.prior_status_code.is_none()
    }

    /// Whether an auth failure arrived after the retry.
    pub fn is_exhausted(&self, status: u16, token: &Token) -> bool {
        self.prior_status_code.is_some() && Self::is_auth_failure(status, token)
    }
}

/// Client for the authenticated API.
///
/// Cloning is cheap; clones share the HTTP connection pool, the
/// [`TokenAuthority`], and the error collector.
///
/// # Examples
///
/// ```no_run
/// use serde::Deserialize;
/// use authlink::api::client::ApiClient;
/// use authlink::api::endpoint::EndpointDescriptor;
/// use authlink::config::Config;
///
/// #[derive(Deserialize)]
/// struct Store {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> authlink::Result<()> {
/// let config = Config::load("authlink.yaml")?;
/// let client = ApiClient::from_config(&config)?;
///
/// let store: Store = client.execute(&EndpointDescriptor::get("stores/7")).await?;
/// println!("{} {}", store.id, store.name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    authority: TokenAuthority,
    collector: Arc<dyn ErrorEventCollector>,
    timeout: Duration,
    mirror_auth_header: Option<String>,
    date_strategy: DateDecodingStrategy,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .field("date_strategy", &self.date_strategy)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client with default timeout, date strategy, and a
    /// [`TracingErrorCollector`].
    pub fn new(http: reqwest::Client, base_url: Url, authority: TokenAuthority) -> Self {
        Self {
            http,
            base_url,
            authority,
            collector: Arc::new(TracingErrorCollector),
            timeout: DEFAULT_TIMEOUT,
            mirror_auth_header: None,
            date_strategy: DateDecodingStrategy::default(),
        }
    }

    /// Builds the whole stack from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthlinkError::Config`] when the configuration is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthlinkError::Config(format!("failed to build HTTP client: {}", e)))?;

        let store: Arc<dyn CredentialStore> = match config.credentials.backend {
            CredentialBackend::Keyring => {
                Arc::new(KeyringCredentialStore::new(config.credentials.service.clone()))
            }
            CredentialBackend::Memory => Arc::new(InMemoryCredentialStore::default()),
        };

        let authority = TokenAuthority::new(http.clone(), config.auth.authority_config()?, store);
        let base_url = config.api.base_url()?;

        let mut client = Self::new(http, base_url, authority)
            .with_timeout(Duration::from_secs(config.api.timeout_seconds))
            .with_date_strategy(config.api.date_strategy.clone());
        if let Some(header) = &config.api.mirror_auth_header {
            client = client.with_mirror_auth_header(header.clone());
        }
        Ok(client)
    }

    /// Replaces the error collector.
    pub fn with_collector(mut self, collector: Arc<dyn ErrorEventCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the date strategy used by [`execute`](Self::execute).
    pub fn with_date_strategy(mut self, strategy: DateDecodingStrategy) -> Self {
        self.date_strategy = strategy;
        self
    }

    /// Repeats the `Authorization` value in a second header named `name`.
    pub fn with_mirror_auth_header(mut self, name: impl Into<String>) -> Self {
        self.mirror_auth_header = Some(name.into());
        self
    }

    /// The token authority used by this client.
    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    /// Executes `endpoint` and decodes the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// - [`AuthlinkError::InvalidUrl`] / [`AuthlinkError::ParameterEncoding`]
    ///   before any network activity.
    /// - [`AuthlinkError::Transport`] when no response was obtained.
    /// - [`AuthlinkError::Api`] for a non-2xx response in the standard error
    ///   shape.
    /// - [`AuthlinkError::AuthExhausted`] when authentication fails again
    ///   after a refresh and the body is not in the standard error shape.
    /// - [`AuthlinkError::Decoding`] when the body does not match `T`.
    pub async fn execute<T, E>(&self, endpoint: &E) -> Result<T>
    where
        T: DeserializeOwned,
        E: Endpoint + ?Sized,
    {
        let context = self.prepare(endpoint)?;
        let span = request_span(&context);

        async {
            let response = self.send_authorized(&context).await?;
            decode_json(&response.body, &self.date_strategy).map_err(|e| {
                self.report(&context, Some(response.status.as_u16()), AuthlinkError::Decoding(e))
            })
        }
        .instrument(span)
        .await
    }

    /// Executes `endpoint` and returns the response body unchanged.
    ///
    /// Fails under the same conditions as [`execute`](Self::execute), except
    /// that no decoding takes place.
    pub async fn execute_raw<E>(&self, endpoint: &E) -> Result<Bytes>
    where
        E: Endpoint + ?Sized,
    {
        let context = self.prepare(endpoint)?;
        let span = request_span(&context);

        async {
            let response = self.send_authorized(&context).await?;
            Ok::<_, AuthlinkError>(response.body)
        }
        .instrument(span)
        .await
    }

    fn prepare<E: Endpoint + ?Sized>(&self, endpoint: &E) -> Result<RequestContext> {
        let url = transport::join_url(&self.base_url, &endpoint.path())?;
        let parameters = endpoint.json_parameters();
        let request = PreparedRequest::new(endpoint.method(), url, parameters.as_ref())?;
        Ok(RequestContext::new(request))
    }

    async fn send_authorized(&self, context: &RequestContext) -> Result<RawResponse> {
        let mut context = context.clone();
        let mut token = self
            .authority
            .valid_token()
            .await
            .map_err(|e| self.report(&context, None, e))?;

        loop {
            let bearer = token.access_token.as_deref().map(|access| Bearer {
                token: access,
                mirror_header: self.mirror_auth_header.as_deref(),
            });
            let response = transport::send(&self.http, &context.request, bearer, self.timeout)
                .await
                .map_err(|e| self.report(&context, None, e))?;
            let status = response.status.as_u16();

            if context.should_refresh(status, &token) {
                tracing::info!(status, "Authentication failure; refreshing token and retrying once");
                context.prior_status_code = Some(status);
                token = self
                    .authority
                    .refresh(Some(status))
                    .await
                    .map_err(|e| self.report(&context, Some(status), e))?;
                continue;
            }

            if response.status.is_success() {
                return Ok(response);
            }

            if let Some(api_error) = decode_api_error(&response.body) {
                return Err(self.report(&context, Some(status), AuthlinkError::Api(api_error)));
            }

            if context.is_exhausted(status, &token) {
                return Err(self.report(
                    &context,
                    Some(status),
                    AuthlinkError::AuthExhausted { status },
                ));
            }

            tracing::debug!(status, "Non-standard error body; decoding as the expected type");
            return Ok(response);
        }
    }

    fn report(
        &self,
        context: &RequestContext,
        status: Option<u16>,
        error: AuthlinkError,
    ) -> AuthlinkError {
        self.collector.collect(ErrorEvent {
            request_id: context.request_id,
            method: context.request.method.to_string(),
            url: context.request.url.to_string(),
            status,
            cause: error.to_string(),
            request_body: context.request.body_text(),
        });
        error
    }
}

fn request_span(context: &RequestContext) -> tracing::Span {
    tracing::info_span!(
        "api_request",
        request_id = %context.request_id,
        method = %context.request.method,
        url = %context.request.url,
    )
}
