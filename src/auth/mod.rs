//! Token management
//!
//! The [`authority::TokenAuthority`] owns the bearer token, runs grant
//! requests with single-flight refresh, and persists tokens through a
//! [`credential_store::CredentialStore`].

pub mod authority;
pub mod credential_store;
pub mod grant;
pub mod token;

pub use authority::{AuthorityConfig, TokenAuthority};
pub use credential_store::{CredentialStore, InMemoryCredentialStore, KeyringCredentialStore};
pub use grant::ClientCredentials;
pub use token::Token;
