//! Error event reporting
//!
//! Every terminal failure of a request (transport failure, decoded
//! [`ApiError`](crate::api::models::ApiError), or decode failure) is handed
//! once to an injected [`ErrorEventCollector`]. Authentication failures that
//! are recovered by the refresh-and-retry cycle are not reported.

use uuid::Uuid;

/// Diagnostic record of a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Identifier of the logical call, shared with its tracing span.
    pub request_id: Uuid,
    /// HTTP method of the request.
    pub method: String,
    /// Full request URL.
    pub url: String,
    /// HTTP status of the final response, when one was received.
    pub status: Option<u16>,
    /// Human-readable cause.
    pub cause: String,
    /// The JSON request body, reconstructed as text.
    pub request_body: Option<String>,
}

/// Sink for terminal request failures.
pub trait ErrorEventCollector: Send + Sync {
    /// Records one failure. Must not block.
    fn collect(&self, event: ErrorEvent);
}

/// Default collector that writes each event as a `tracing` error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorCollector;

impl ErrorEventCollector for TracingErrorCollector {
    fn collect(&self, event: ErrorEvent) {
        tracing::error!(
            request_id = %event.request_id,
            method = %event.method,
            url = %event.url,
            status = ?event.status,
            request_body = ?event.request_body,
            "Request failed: {}",
            event.cause
        );
    }
}
