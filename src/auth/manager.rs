//! Token manager: the public face of the token lifecycle
//!
//! Construction and token installation are separate steps. Build the
//! manager with [`TokenManager::new`], then call [`TokenManager::seed`] or
//! [`TokenManager::complete_authorization`] to bring tokens in.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::error::AuthError;
use super::exchange::{TokenExchange, TokenResponse};
use super::scheduler::{Phase, RefreshScheduler};
use super::tokens::{TokenPair, TokenStore};

pub struct TokenManager {
    store: Arc<TokenStore>,
    exchanger: Arc<dyn TokenExchange>,
    scheduler: Arc<RefreshScheduler>,
    seed_expires_in: u64,
}

impl TokenManager {
    /// `buffer` is subtracted from every provider lifetime; `seed_expires_in`
    /// is the lifetime assumed for seeded tokens.
    pub fn new(exchanger: Arc<dyn TokenExchange>, buffer: Duration, seed_expires_in: u64) -> Self {
        let store = Arc::new(TokenStore::new());
        let scheduler = RefreshScheduler::new(store.clone(), exchanger.clone(), buffer);
        Self {
            store,
            exchanger,
            scheduler,
            seed_expires_in,
        }
    }

    /// Install externally supplied long-lived credentials as if just issued.
    pub fn seed(&self, pair: TokenPair) {
        tracing::info!("Initializing with existing tokens from configuration");
        self.scheduler.install(&TokenResponse {
            token_type: Some("bearer".to_string()),
            expires_in: self.seed_expires_in,
            access_token: pair.access_token,
            scope: None,
            refresh_token: pair.refresh_token,
        });
    }

    /// Exchange an authorization code from the redirect callback and install
    /// the resulting tokens. Also the way out of the failed state.
    pub async fn complete_authorization(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .exchanger
            .exchange_authorization_code(code, redirect_uri, code_verifier)
            .await?;
        self.scheduler.install(&response);
        tracing::info!("Authentication successful, tokens updated");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    /// Refresh now (or join the refresh in flight). Returns whether the
    /// manager is authenticated afterwards.
    pub async fn force_refresh(&self) -> bool {
        if let Err(e) = self.scheduler.refresh().await {
            tracing::warn!("Forced refresh did not succeed: {}", e);
        }
        self.is_authenticated()
    }

    /// Reactive refresh after the API rejected `rejected`.
    pub(crate) async fn refresh_rejected(&self, rejected: &str) -> Result<(), AuthError> {
        self.scheduler.refresh_rejected(rejected).await
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    /// Wall-clock instant at which the current token enters its refresh window.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.store.read().map(|state| state.expires_at_utc)
    }
}
