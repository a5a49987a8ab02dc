//! Authenticated API access
//!
//! - [`endpoint`]: describing a call
//! - [`client`]: the request pipeline with one refresh-and-retry
//! - [`decode`]: JSON decoding with diagnostics and date strategies
//! - [`models`]: shared wire models such as [`models::ApiError`]
//! - [`events`]: reporting of terminal request failures

pub mod client;
pub mod decode;
pub mod endpoint;
pub mod events;
pub mod models;
pub(crate) mod transport;

pub use client::ApiClient;
pub use endpoint::{Endpoint, EndpointDescriptor};
pub use events::{ErrorEvent, ErrorEventCollector};
pub use models::ApiError;
