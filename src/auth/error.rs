//! Error taxonomy for token exchanges and authenticated calls

use thiserror::Error;

/// Errors surfaced by the token manager and the authenticated executor.
///
/// `Clone` because a single refresh outcome is shared by every caller that
/// coalesced into it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The provider rejected a code or refresh-token exchange, or returned a
    /// body that is not a usable token response.
    #[error("token exchange failed ({}): {body}", status_label(.status))]
    ExchangeFailed { status: Option<u16>, body: String },

    /// No token is held; authorization is required.
    #[error("not authenticated: authorization required")]
    NotAuthenticated,

    /// An authenticated call failed with something other than 401.
    #[error("request failed ({}): {body}", status_label(.status))]
    RequestFailed { status: Option<u16>, body: String },

    /// A 401 persisted after a successful refresh and one retry.
    #[error("request still unauthorized after token refresh")]
    RetryExhausted,
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {}", code),
        None => "no response".to_string(),
    }
}
