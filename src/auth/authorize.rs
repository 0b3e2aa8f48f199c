//! Authorization-code entry point with PKCE
//!
//! Builds the provider authorization URL (S256 challenge plus a random CSRF
//! state) and remembers each verifier until the redirect callback claims it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    Scope, TokenUrl,
};
use tokio::time::Instant;

use crate::config::Config;

/// How long an authorization attempt may take before its verifier is dropped.
const PENDING_TTL: Duration = Duration::from_secs(600);

struct PendingAuthorization {
    verifier: PkceCodeVerifier,
    started_at: Instant,
}

pub struct Authorizer {
    client: BasicClient,
    redirect_uri: String,
    scopes: Vec<String>,
    pending: Mutex<HashMap<String, PendingAuthorization>>,
}

impl Authorizer {
    pub fn new(config: &Config) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(config.authorize_url.clone()).context("Invalid authorize_url")?,
            Some(TokenUrl::new(config.token_url.clone()).context("Invalid token_url")?),
        )
        .set_redirect_uri(
            RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect_uri")?,
        );

        Ok(Self {
            client,
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Start an authorization attempt and return the URL to send the user to.
    pub fn begin(&self) -> url::Url {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(challenge)
            .url();

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|_, p| p.started_at.elapsed() < PENDING_TTL);
        pending.insert(
            csrf.secret().clone(),
            PendingAuthorization {
                verifier,
                started_at: Instant::now(),
            },
        );
        tracing::debug!("Authorization started ({} pending)", pending.len());

        url
    }

    /// Claim the verifier for `state`. Each state can be claimed once.
    pub fn take_verifier(&self, state: &str) -> Option<PkceCodeVerifier> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let entry = pending.remove(state)?;
        if entry.started_at.elapsed() >= PENDING_TTL {
            tracing::warn!("Authorization state expired");
            return None;
        }
        Some(entry.verifier)
    }
}
