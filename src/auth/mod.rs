//! Authentication module for per-user OAuth2 credentials
//!
//! This module provides:
//! - PKCE code and state token generation
//! - Token and pending-state storage (SQLite or in-memory)
//! - OAuth2 authorization servers (`GoogleOAuthProvider`)
//! - `OAuthFlowController` driving login, callback, refresh and logout

mod pkce;
mod credentials;
mod provider;
mod flow;
pub mod store;

pub use credentials::{OAuthState, OAuthToken, TokenGrant};
pub use flow::{LoginOutcome, OAuthFlowController};
pub use provider::{GoogleOAuthProvider, OAuthProvider, GOOGLE_PROVIDER};
pub use store::{InMemoryTokenStore, SqliteTokenStore, TokenStore};

#[cfg(test)]
pub(crate) use flow::testing;
#[cfg(test)]
pub(crate) use provider::fake::FakeOAuthProvider;
