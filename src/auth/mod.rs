//! OAuth2 token lifecycle
//!
//! Acquires tokens through the authorization-code flow (or a configured
//! seed), refreshes them on a timer before they expire, and repairs them on
//! demand when the API answers 401. At most one refresh exchange is in flight
//! at any time.

pub mod authorize;
pub mod error;
pub mod exchange;
pub mod manager;
pub mod scheduler;
pub mod tokens;

#[cfg(test)]
pub mod testing;

pub use authorize::Authorizer;
pub use error::AuthError;
pub use exchange::{ClientCredentials, HttpTokenExchanger};
pub use manager::TokenManager;
pub use scheduler::Phase;
pub use tokens::TokenPair;
