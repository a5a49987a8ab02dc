//! Endpoint descriptors
//!
//! Feature code describes each call as an [`Endpoint`]: a path relative to the
//! API base URL, an HTTP method, and optional JSON body parameters.
//! [`EndpointDescriptor`] is a ready-made implementation for ad hoc calls.

use reqwest::Method;
use serde_json::{Map, Value};

/// Description of a single API call.
pub trait Endpoint: Send + Sync {
    /// Path relative to the API base URL.
    fn path(&self) -> String;

    /// HTTP method.
    fn method(&self) -> Method;

    /// JSON body parameters. When present, the request is sent with
    /// `Content-Type: application/json`.
    fn json_parameters(&self) -> Option<Map<String, Value>> {
        None
    }
}

/// Plain-data [`Endpoint`].
///
/// # Examples
///
/// ```
/// use authlink::api::endpoint::{Endpoint, EndpointDescriptor};
/// use reqwest::Method;
/// use serde_json::json;
///
/// let endpoint = EndpointDescriptor::post("basket/items")
///     .with_parameter("sku", json!("A1"))
///     .with_parameter("quantity", json!(2));
///
/// assert_eq!(endpoint.method(), Method::POST);
/// assert_eq!(endpoint.json_parameters().unwrap()["quantity"], json!(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    /// Path relative to the API base URL.
    pub path: String,
    /// HTTP method.
    pub method: Method,
    /// JSON body parameters.
    pub parameters: Option<Map<String, Value>>,
}

impl EndpointDescriptor {
    /// Creates a descriptor with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            parameters: None,
        }
    }

    /// `GET` descriptor.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` descriptor.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Replaces the body parameters.
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Adds a single body parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

impl Endpoint for EndpointDescriptor {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn method(&self) -> Method {
        self.method.clone()
    }

    fn json_parameters(&self) -> Option<Map<String, Value>> {
        self.parameters.clone()
    }
}
