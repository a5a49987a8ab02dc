//! HTTP request construction and sending
//!
//! Shared by the request pipeline and the token authority. A
//! [`PreparedRequest`] holds everything that does not change between the
//! first attempt and the post-refresh retry; only the bearer token is applied
//! at send time.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{AuthlinkError, Result};

/// A request ready to be sent, minus its bearer credential.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Vec<u8>>,
}

impl PreparedRequest {
    /// Serializes `parameters` as the JSON body.
    pub fn new(method: Method, url: Url, parameters: Option<&Map<String, Value>>) -> Result<Self> {
        let body = parameters
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| AuthlinkError::ParameterEncoding(e.to_string()))?;

        Ok(Self { method, url, body })
    }

    /// The JSON body as text, for diagnostics.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Bearer credential applied to an outgoing request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bearer<'a> {
    pub token: &'a str,
    /// Secondary header that repeats the `Authorization` value.
    pub mirror_header: Option<&'a str>,
}

/// Appends `path` to `base`, treating `base` as a directory.
///
/// `https://api.example.com/v1` joined with `/basket` yields
/// `https://api.example.com/v1/basket`.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url> {
    if base.cannot_be_a_base() {
        return Err(AuthlinkError::InvalidUrl(format!(
            "base URL '{}' cannot carry a path",
            base
        )));
    }

    let mut directory = base.clone();
    if !directory.path().ends_with('/') {
        let with_slash = format!("{}/", directory.path());
        directory.set_path(&with_slash);
    }

    directory
        .join(path.trim_start_matches('/'))
        .map_err(|e| AuthlinkError::InvalidUrl(format!("'{}' + '{}': {}", base, path, e)))
}

/// Sends `request` and buffers the full response body.
///
/// Any failure to obtain a response, including timeouts and failures while
/// reading the body, is returned as [`AuthlinkError::Transport`].
pub(crate) async fn send(
    http: &reqwest::Client,
    request: &PreparedRequest,
    bearer: Option<Bearer<'_>>,
    timeout: Duration,
) -> Result<RawResponse> {
    let mut builder = http
        .request(request.method.clone(), request.url.clone())
        .timeout(timeout);

    if let Some(body) = &request.body {
        builder = builder
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());
    }

    if let Some(bearer) = bearer {
        let value = format!("Bearer {}", bearer.token);
        if let Some(name) = bearer.mirror_header {
            builder = builder.header(name, value.as_str());
        }
        builder = builder.header(reqwest::header::AUTHORIZATION, value);
    }

    tracing::trace!(method = %request.method, url = %request.url, "Sending request");

    let response = builder.send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    tracing::debug!(
        method = %request.method,
        url = %request.url,
        status = status.as_u16(),
        bytes = body.len(),
        "Received response"
    );

    Ok(RawResponse { status, body })
}
