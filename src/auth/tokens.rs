//! Token storage and expiry bookkeeping

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::exchange::TokenResponse;

/// Access/refresh token pair as issued by the provider.
///
/// Never mutated; a refresh replaces the whole pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The live token pair plus the instant at which it should be refreshed.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub pair: TokenPair,
    /// `issued_at + expires_in - buffer`, saturating at `issued_at`.
    pub expires_at: Instant,
    /// Wall-clock rendering of `expires_at`, for status output.
    pub expires_at_utc: DateTime<Utc>,
}

impl TokenState {
    /// Build a state from a token response received at `issued_at`.
    pub fn issue(response: &TokenResponse, issued_at: Instant, buffer: Duration) -> Self {
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(buffer);
        let expires_at_utc = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or_else(Utc::now);

        Self {
            pair: TokenPair::new(
                response.access_token.clone(),
                response.refresh_token.clone(),
            ),
            expires_at: issued_at + lifetime,
            expires_at_utc,
        }
    }

    pub fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }

    /// Time left until the refresh window opens (zero once inside it).
    pub fn time_until_refresh(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Holder of the single live [`TokenState`].
///
/// Readers get an `Arc` snapshot, so a concurrent write never exposes a
/// half-updated state.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<Arc<TokenState>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> Option<Arc<TokenState>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn write(&self, state: TokenState) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(state));
    }

    /// Drop the held state. Only a failed refresh does this.
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some_and(|state| state.is_live())
    }

    /// Access token of the held pair, whether or not its refresh window has opened.
    pub fn access_token(&self) -> Option<String> {
        self.read().map(|state| state.pair.access_token.clone())
    }
}
