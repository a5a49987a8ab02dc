//! Token authority integration tests using wiremock
//!
//! Covers the grant flows of `src/auth/authority.rs`:
//!
//! - Concurrent refreshes share a single grant request.
//! - A rejected refresh token flushes both tokens and falls back to exactly
//!   one client-credentials grant.
//! - Cancelling one waiter does not cancel the shared refresh.
//! - Sign-in and sign-out update the token and the credential store.

mod common;

use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authlink::auth::credential_store::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use authlink::AuthlinkError;

use common::{api_error_body, authority, token_body, SIGN_OUT_PATH, TOKEN_PATH};

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object literal")
}

// ---------------------------------------------------------------------------
// Single-flight refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_refreshes_send_one_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"refresh_token""#))
        .and(body_string_contains(r#""refresh_token":"r1""#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("a2", Some("r2")))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, Some("a1"), Some("r1"));

    let results = join_all((0..8).map(|_| authority.refresh(Some(401)))).await;

    for result in results {
        let token = result.expect("refresh should succeed");
        assert_eq!(token.access_token.as_deref(), Some("a2"));
        assert_eq!(token.refresh_token.as_deref(), Some("r2"));
    }
    assert!(!authority.refresh_in_flight());
}

#[tokio::test]
async fn test_concurrent_valid_token_on_empty_token_sends_one_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"client_credentials""#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("anon", None))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, None, None);

    let results = join_all((0..5).map(|_| authority.valid_token())).await;

    for result in results {
        assert_eq!(result.unwrap().access_token.as_deref(), Some("anon"));
    }
}

#[tokio::test]
async fn test_failed_refresh_is_shared_by_every_waiter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(api_error_body(500, "identity service down"))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, None, None);

    let results = join_all((0..4).map(|_| authority.refresh(None))).await;

    for result in results {
        let error = result.unwrap_err();
        assert_eq!(error.api_error().map(|e| e.error_code), Some(500));
    }
}

#[tokio::test]
async fn test_cancelled_waiter_does_not_cancel_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("a2", Some("r2")))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, Some("a1"), Some("r1"));

    let first = {
        let authority = authority.clone();
        tokio::spawn(async move { authority.refresh(Some(401)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(authority.refresh_in_flight());
    first.abort();

    let token = authority.refresh(Some(401)).await.unwrap();
    assert_eq!(token.access_token.as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_refresh_after_completion_starts_new_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a2", Some("r2"))))
        .expect(2)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, Some("a1"), Some("r1"));

    authority.refresh(None).await.unwrap();
    authority.refresh(None).await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_expires_in_does_not_wedge_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": i64::MAX,
            "access_token": "a2",
            "refresh_token": "r2",
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a3", Some("r3"))))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, Some("a1"), Some("r1"));

    let first = authority.refresh(Some(401)).await.unwrap();
    assert_eq!(first.access_token.as_deref(), Some("a2"));
    assert!(first.expires_at.is_none());
    assert!(!authority.refresh_in_flight());

    let second = authority.refresh(Some(401)).await.unwrap();
    assert_eq!(second.access_token.as_deref(), Some("a3"));
}

#[tokio::test]
async fn test_flush_during_refresh_is_not_undone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("a2", Some("r2")))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, Some("a1"), Some("r1"));

    let refresh = {
        let authority = authority.clone();
        tokio::spawn(async move { authority.refresh(Some(401)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    authority.flush_tokens();

    let outcome = refresh.await.unwrap();

    assert!(
        matches!(outcome, Err(AuthlinkError::RefreshAborted(_))),
        "{outcome:?}"
    );
    assert!(authority.current_token().is_empty());
    assert!(store.get(ACCESS_TOKEN_KEY).unwrap().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_sign_in_during_refresh_keeps_signed_in_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"client_credentials""#))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("anon", None))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"password""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-a", Some("user-r"))))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, None, None);

    let refresh = {
        let authority = authority.clone();
        tokio::spawn(async move { authority.refresh(None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    authority
        .sign_in(None, params(json!({"username": "ada", "password": "pw"})))
        .await
        .unwrap();

    let token = refresh.await.unwrap().unwrap();

    assert_eq!(token.access_token.as_deref(), Some("user-a"));
    assert_eq!(authority.current_token().access_token.as_deref(), Some("user-a"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("user-r"));
}

// ---------------------------------------------------------------------------
// Refresh-token fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rejected_refresh_token_falls_back_to_client_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"refresh_token""#))
        .respond_with(ResponseTemplate::new(400).set_body_json(api_error_body(4001, "invalid_grant")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"client_credentials""#))
        .and(body_string_contains(r#""scope":"*""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("anon", None)))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, Some("a1"), Some("r1"));

    let token = authority.refresh(Some(401)).await.unwrap();

    assert_eq!(token.access_token.as_deref(), Some("anon"));
    assert!(token.refresh_token.is_none());
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("anon"));
    assert!(store.get(REFRESH_TOKEN_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_fallback_failure_is_final_and_leaves_token_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"refresh_token""#))
        .respond_with(ResponseTemplate::new(400).set_body_json(api_error_body(4001, "invalid_grant")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"client_credentials""#))
        .respond_with(ResponseTemplate::new(401).set_body_json(api_error_body(4010, "invalid_client")))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, Some("a1"), Some("r1"));

    let error = authority.refresh(Some(401)).await.unwrap_err();

    assert_eq!(error.api_error().map(|e| e.error_code), Some(4010));
    assert!(authority.current_token().is_empty());
    assert!(store.get(ACCESS_TOKEN_KEY).unwrap().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_without_refresh_token_only_client_credentials_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"refresh_token""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("x", None)))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"client_credentials""#))
        .and(body_string_contains(r#""client_id":"test-client""#))
        .and(body_string_contains(r#""client_secret":"test-secret""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("anon", None)))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, None, None);

    let token = authority.refresh(None).await.unwrap();
    assert_eq!(token.access_token.as_deref(), Some("anon"));
}

#[tokio::test]
async fn test_undecodable_grant_response_is_decoding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, None, None);

    let error = authority.refresh(None).await.unwrap_err();
    assert!(matches!(error, AuthlinkError::Decoding(_)), "{error}");
}

// ---------------------------------------------------------------------------
// Sign-in / sign-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sign_in_with_password_stores_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"password""#))
        .and(body_string_contains(r#""username":"ada@example.com""#))
        .and(body_string_contains(r#""password":"hunter2""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-a", Some("user-r"))))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, Some("anon"), None);

    let signed_in = authority
        .sign_in(
            None,
            params(json!({"username": "ada@example.com", "password": "hunter2"})),
        )
        .await
        .unwrap();

    assert!(signed_in);
    assert_eq!(authority.current_token().access_token.as_deref(), Some("user-a"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("user-r"));
}

#[tokio::test]
async fn test_sign_in_with_provider_uses_custom_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(r#""grant_type":"custom_request""#))
        .and(body_string_contains(r#""provider":"google""#))
        .and(body_string_contains(r#""id_token":"g-123""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-g", Some("rg"))))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, None, None);

    let signed_in = authority
        .sign_in(Some("google"), params(json!({"id_token": "g-123"})))
        .await
        .unwrap();

    assert!(signed_in);
    assert_eq!(authority.current_token().access_token.as_deref(), Some("user-g"));
}

#[tokio::test]
async fn test_failed_sign_in_keeps_current_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(api_error_body(4002, "bad credentials")))
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, Some("anon"), None);

    let error = authority
        .sign_in(None, params(json!({"username": "ada", "password": "wrong"})))
        .await
        .unwrap_err();

    assert_eq!(error.api_error().map(|e| e.error_text.as_str()), Some("bad credentials"));
    assert_eq!(authority.current_token().access_token.as_deref(), Some("anon"));
}

#[tokio::test]
async fn test_successful_sign_out_flushes_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SIGN_OUT_PATH))
        .and(header("Authorization", "Bearer user-a"))
        .and(body_string_contains(r#""device":"d1""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, Some("user-a"), Some("user-r"));

    let signed_out = authority.sign_out(params(json!({"device": "d1"}))).await.unwrap();

    assert!(signed_out);
    assert!(authority.current_token().is_empty());
    assert!(store.get(ACCESS_TOKEN_KEY).unwrap().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_sign_out_without_access_token_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SIGN_OUT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&server)
        .await;

    let (authority, _store) = authority(&server, None, None);

    assert!(!authority.sign_out(Map::new()).await.unwrap());
}

#[tokio::test]
async fn test_rejected_sign_out_keeps_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SIGN_OUT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&server)
        .await;

    let (authority, store) = authority(&server, Some("user-a"), Some("user-r"));

    let signed_out = authority.sign_out(Map::new()).await.unwrap();

    assert!(!signed_out);
    assert_eq!(authority.current_token().access_token.as_deref(), Some("user-a"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("user-r"));
}
