//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use url::Url;
use wiremock::MockServer;

use authlink::api::events::{ErrorEvent, ErrorEventCollector};
use authlink::auth::authority::{AuthorityConfig, TokenAuthority};
use authlink::auth::credential_store::InMemoryCredentialStore;
use authlink::auth::grant::ClientCredentials;
use authlink::auth::token::Token;
use authlink::ApiClient;

pub const TOKEN_PATH: &str = "/oauth/token";
pub const SIGN_OUT_PATH: &str = "/oauth/logout";

/// Collector that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingCollector {
    events: Mutex<Vec<ErrorEvent>>,
}

impl RecordingCollector {
    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().expect("collector lock").clone()
    }
}

impl ErrorEventCollector for RecordingCollector {
    fn collect(&self, event: ErrorEvent) {
        self.events.lock().expect("collector lock").push(event);
    }
}

/// Successful grant response body.
pub fn token_body(access: &str, refresh: Option<&str>) -> Value {
    let mut body = json!({
        "token_type": "Bearer",
        "expires_in": 3600,
        "access_token": access,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    body
}

/// Body in the API's standard error shape.
pub fn api_error_body(code: i64, text: &str) -> Value {
    json!({
        "errorCode": code,
        "errorText": text,
        "errorDisplay": "Something went wrong",
        "success": false,
    })
}

/// Authority whose identity endpoints live on `server`.
pub fn authority(
    server: &MockServer,
    access: Option<&str>,
    refresh: Option<&str>,
) -> (TokenAuthority, Arc<InMemoryCredentialStore>) {
    let store = Arc::new(InMemoryCredentialStore::with_token(&Token::new(
        access.map(str::to_string),
        refresh.map(str::to_string),
    )));
    let config = AuthorityConfig {
        token_url: Url::parse(&format!("{}{}", server.uri(), TOKEN_PATH)).expect("token url"),
        sign_out_url: Url::parse(&format!("{}{}", server.uri(), SIGN_OUT_PATH))
            .expect("sign-out url"),
        credentials: ClientCredentials::new("test-client", "test-secret"),
        timeout: Duration::from_secs(5),
    };
    let authority = TokenAuthority::new(reqwest::Client::new(), config, store.clone());
    (authority, store)
}

/// Client rooted at `{server}/api` with a recording collector.
pub fn client(
    server: &MockServer,
    access: Option<&str>,
    refresh: Option<&str>,
) -> (ApiClient, Arc<RecordingCollector>, Arc<InMemoryCredentialStore>) {
    let (authority, store) = authority(server, access, refresh);
    let collector = Arc::new(RecordingCollector::default());
    let base_url = Url::parse(&format!("{}/api", server.uri())).expect("base url");
    let client = ApiClient::new(reqwest::Client::new(), base_url, authority)
        .with_collector(collector.clone());
    (client, collector, store)
}
