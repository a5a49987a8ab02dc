//! Token lifecycle owner
//!
//! The [`TokenAuthority`] holds the in-memory [`Token`], performs grant
//! requests against the identity endpoint, and mirrors every new token into
//! the [`CredentialStore`].
//!
//! # Single-flight refresh
//!
//! At most one refresh runs per authority. The first caller spawns the grant
//! request as a Tokio task and parks a shared handle to its outcome; every
//! caller arriving while that handle is parked awaits the same outcome instead
//! of sending a second grant request. Dropping a waiter never cancels the
//! task, so one cancelled request cannot starve the others.
//!
//! # Refresh-token fallback
//!
//! When the stored refresh token is rejected, both tokens are flushed and a
//! single client-credentials grant is attempted. That second grant has no
//! refresh token to fall back from, so the fallback cannot repeat.
//!
//! # Superseded refreshes
//!
//! Sign-in, sign-out, [`TokenAuthority::set_access_token`], and
//! [`TokenAuthority::flush_tokens`] advance a token generation. A refresh that
//! started under an older generation discards its grant result instead of
//! overwriting the newer token.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::Instrument;
use url::Url;

use crate::api::decode::{decode_response, DateDecodingStrategy};
use crate::api::models::SignOutResponse;
use crate::api::transport::{self, Bearer, PreparedRequest};
use crate::auth::credential_store::{load_token, persist_token, CredentialStore};
use crate::auth::grant::{ClientCredentials, GrantRequest};
use crate::auth::token::{GrantResponse, Token};
use crate::error::{AuthlinkError, Result};

/// Identity endpoint settings.
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Grant endpoint (`POST`).
    pub token_url: Url,
    /// Sign-out endpoint (`POST`, bearer required).
    pub sign_out_url: Url,
    /// Application credentials sent with every grant.
    pub credentials: ClientCredentials,
    /// Timeout applied to each grant and sign-out request.
    pub timeout: Duration,
}

type PendingRefresh = Shared<BoxFuture<'static, Result<Token>>>;

/// Owner of the current [`Token`].
///
/// Cloning is cheap; clones share the same token and in-flight refresh.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use url::Url;
/// use authlink::auth::authority::{AuthorityConfig, TokenAuthority};
/// use authlink::auth::credential_store::InMemoryCredentialStore;
/// use authlink::auth::grant::ClientCredentials;
///
/// # async fn example() -> authlink::Result<()> {
/// let authority = TokenAuthority::new(
///     reqwest::Client::new(),
///     AuthorityConfig {
///         token_url: Url::parse("https://id.example.com/oauth/token").unwrap(),
///         sign_out_url: Url::parse("https://id.example.com/oauth/logout").unwrap(),
///         credentials: ClientCredentials::new("app", "secret"),
///         timeout: Duration::from_secs(30),
///     },
///     Arc::new(InMemoryCredentialStore::default()),
/// );
///
/// let token = authority.refresh(None).await?;
/// assert!(token.access_token.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenAuthority {
    inner: Arc<AuthorityInner>,
}

struct AuthorityInner {
    http: reqwest::Client,
    config: AuthorityConfig,
    store: Arc<dyn CredentialStore>,
    token: RwLock<Token>,
    generation: AtomicU64,
    pending: Mutex<Option<PendingRefresh>>,
}

/// Empties the pending slot when the refresh task ends, including by panic.
struct ClearPendingOnDrop(Arc<AuthorityInner>);

impl Drop for ClearPendingOnDrop {
    fn drop(&mut self) {
        *self.0.lock_pending() = None;
    }
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("token_url", &self.inner.config.token_url.as_str())
            .field("refresh_in_flight", &self.refresh_in_flight())
            .finish()
    }
}

impl TokenAuthority {
    /// Creates an authority seeded with the token persisted in `store`.
    pub fn new(
        http: reqwest::Client,
        config: AuthorityConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let token = load_token(store.as_ref());
        tracing::debug!(
            has_access_token = token.access_token.is_some(),
            has_refresh_token = token.refresh_token.is_some(),
            "Loaded persisted token"
        );

        Self {
            inner: Arc::new(AuthorityInner {
                http,
                config,
                store,
                token: RwLock::new(token),
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Returns the in-memory token without any network call.
    pub fn current_token(&self) -> Token {
        self.inner.current_token()
    }

    /// Returns `true` while a refresh is in flight.
    pub fn refresh_in_flight(&self) -> bool {
        self.inner.lock_pending().is_some()
    }

    /// Obtains a new token, joining the in-flight refresh if there is one.
    ///
    /// `prior_status_code` is the status that triggered the refresh, if any;
    /// it is recorded for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns the grant failure shared by every caller attached to this
    /// refresh: [`AuthlinkError::Api`], [`AuthlinkError::Transport`], or
    /// [`AuthlinkError::Decoding`].
    pub async fn refresh(&self, prior_status_code: Option<u16>) -> Result<Token> {
        let pending = {
            let mut slot = self.inner.lock_pending();
            self.join_or_start(&mut slot, prior_status_code)
        };
        pending.await
    }

    /// Returns the current token if it has an access token, otherwise
    /// refreshes.
    ///
    /// The check and the refresh start happen under one lock, so callers that
    /// race on an empty token all share a single grant request.
    pub async fn valid_token(&self) -> Result<Token> {
        let pending = {
            let mut slot = self.inner.lock_pending();
            let token = self.inner.current_token();
            if token.access_token.is_some() {
                return Ok(token);
            }
            self.join_or_start(&mut slot, None)
        };
        pending.await
    }

    /// Signs in with a password grant, or a custom-request grant when a
    /// `provider` is named. `parameters` override the default grant fields.
    ///
    /// # Errors
    ///
    /// Returns the decoded [`AuthlinkError::Api`] or a transport error; the
    /// current token is left untouched on failure.
    pub async fn sign_in(
        &self,
        provider: Option<&str>,
        parameters: Map<String, Value>,
    ) -> Result<bool> {
        let request =
            GrantRequest::sign_in(&self.inner.config.credentials, provider).with_parameters(parameters);
        let token = self.inner.request_grant(request).await?;
        self.inner.store_token(token);
        tracing::info!(provider = provider.unwrap_or("password"), "Signed in");
        Ok(true)
    }

    /// Revokes the session at the sign-out endpoint.
    ///
    /// Tokens are flushed only when the server answers `{"success": true}`;
    /// otherwise the current token stays in place and `false` is returned.
    /// Without an access token there is no session to revoke, so `false` is
    /// returned without a network call.
    pub async fn sign_out(&self, parameters: Map<String, Value>) -> Result<bool> {
        let token = self.current_token();
        let Some(access_token) = token.access_token.as_deref() else {
            tracing::debug!("No access token held; skipping sign-out request");
            return Ok(false);
        };
        let request = PreparedRequest::new(
            Method::POST,
            self.inner.config.sign_out_url.clone(),
            Some(&parameters),
        )?;
        let bearer = Bearer {
            token: access_token,
            mirror_header: None,
        };

        let response =
            transport::send(&self.inner.http, &request, Some(bearer), self.inner.config.timeout)
                .await?;
        let outcome: SignOutResponse =
            decode_response(&response, &DateDecodingStrategy::default())?;

        if outcome.success {
            tracing::info!("Signed out; flushing tokens");
            self.flush_tokens();
        } else {
            tracing::warn!("Sign-out rejected by server; keeping current token");
        }
        Ok(outcome.success)
    }

    /// Replaces the token with one obtained by an external grant exchange.
    pub fn set_access_token(&self, response: GrantResponse) {
        self.inner.store_token(Token::from(response));
    }

    /// Clears the token from memory and the credential store.
    pub fn flush_tokens(&self) {
        self.inner.store_token(Token::default());
    }

    fn join_or_start(
        &self,
        slot: &mut Option<PendingRefresh>,
        prior_status_code: Option<u16>,
    ) -> PendingRefresh {
        if let Some(pending) = slot.as_ref() {
            tracing::debug!(prior_status = ?prior_status_code, "Joining in-flight token refresh");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("token_refresh", prior_status = ?prior_status_code);
        let task = tokio::spawn(
            async move {
                let _clear = ClearPendingOnDrop(Arc::clone(&inner));
                inner.run_refresh().await
            }
            .instrument(span),
        );

        let pending = async move {
            task.await
                .unwrap_or_else(|e| Err(AuthlinkError::RefreshAborted(e.to_string())))
        }
        .boxed()
        .shared();

        *slot = Some(pending.clone());
        pending
    }
}

impl AuthorityInner {
    fn current_token(&self) -> Token {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingRefresh>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the token and starts a new generation.
    fn store_token(&self, token: Token) {
        let mut current = self.token.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        persist_token(self.store.as_ref(), &token);
        *current = token;
    }

    /// Replaces the token only if no other writer ran since `generation`.
    fn store_if_current(&self, token: &Token, generation: u64) -> bool {
        let mut current = self.token.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        persist_token(self.store.as_ref(), token);
        *current = token.clone();
        true
    }

    fn commit_refresh(&self, token: Token, generation: u64) -> Result<Token> {
        if self.store_if_current(&token, generation) {
            return Ok(token);
        }

        tracing::info!("Token replaced while refresh was in flight; discarding grant result");
        let current = self.current_token();
        if current.access_token.is_some() {
            Ok(current)
        } else {
            Err(AuthlinkError::RefreshAborted(
                "tokens were cleared while the refresh was in flight".to_string(),
            ))
        }
    }

    async fn run_refresh(&self) -> Result<Token> {
        let credentials = &self.config.credentials;
        let generation = self.generation.load(Ordering::SeqCst);

        let Some(refresh_token) = self.current_token().refresh_token else {
            tracing::debug!("Requesting client_credentials grant");
            let token = self
                .request_grant(GrantRequest::client_credentials(credentials))
                .await?;
            return self.commit_refresh(token, generation);
        };

        tracing::debug!("Requesting refresh_token grant");
        match self
            .request_grant(GrantRequest::refresh_token(credentials, &refresh_token))
            .await
        {
            Ok(token) => self.commit_refresh(token, generation),
            Err(e) => {
                if !self.store_if_current(&Token::default(), generation) {
                    tracing::debug!("Refresh token rejected after the token was replaced");
                    return self.commit_refresh(Token::default(), generation);
                }
                tracing::warn!(
                    "Refresh token rejected ({}); flushing tokens and falling back to client_credentials",
                    e
                );
                let token = self
                    .request_grant(GrantRequest::client_credentials(credentials))
                    .await?;
                self.commit_refresh(token, generation)
            }
        }
    }

    /// Sends a grant request and decodes the issued token without storing it.
    async fn request_grant(&self, request: GrantRequest) -> Result<Token> {
        let grant_type = request.grant_type.as_str();
        let prepared = PreparedRequest::new(
            Method::POST,
            self.config.token_url.clone(),
            Some(&request.to_body()),
        )?;

        let outcome = async {
            let response = transport::send(&self.http, &prepared, None, self.config.timeout).await?;
            decode_response::<GrantResponse>(&response, &DateDecodingStrategy::default())
        }
        .await;

        match outcome {
            Ok(response) => {
                tracing::debug!(grant_type, "Grant succeeded");
                Ok(Token::from(response))
            }
            Err(e) => {
                tracing::debug!(grant_type, "Grant failed: {}", e);
                Err(e)
            }
        }
    }
}
