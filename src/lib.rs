//! Authlink - authenticated access to a JSON HTTP API
//!
//! This library wraps a remote REST API behind an OAuth-style bearer token
//! lifecycle: tokens are obtained and refreshed on demand, persisted in a
//! credential store, and attached to every request. A request that fails
//! authentication triggers one refresh and one retry.
//!
//! # Architecture
//!
//! - `auth`: token model, grant requests, credential storage, and the
//!   single-flight [`TokenAuthority`]
//! - `api`: endpoint descriptors, the [`ApiClient`] request pipeline,
//!   response decoding, and error-event reporting
//! - `config`: YAML configuration with environment overrides
//! - `logging`: `tracing` subscriber setup
//! - `error`: error types and result alias
//!
//! # Example
//!
//! ```no_run
//! use authlink::{ApiClient, Config, EndpointDescriptor};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Basket {
//!     items: Vec<String>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("authlink.yaml")?;
//!     authlink::logging::init_logging(&config.logging)?;
//!
//!     let client = ApiClient::from_config(&config)?;
//!     let basket: Basket = client.execute(&EndpointDescriptor::get("basket")).await?;
//!     println!("{} items", basket.items.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, Endpoint, EndpointDescriptor};
pub use auth::{Token, TokenAuthority};
pub use config::Config;
pub use error::{AuthlinkError, Result};
