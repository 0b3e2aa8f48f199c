//! Configuration loading
//!
//! Read once at startup from a TOML file, then overridden by environment
//! variables. Tokens are never written back: they live for the process only.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{ClientCredentials, TokenPair};

/// Application configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth2 client ID (confidential client)
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Provider authorization endpoint
    pub authorize_url: String,
    /// Provider token endpoint
    pub token_url: String,
    /// Redirect URI registered with the provider; served by the callback server
    pub redirect_uri: String,
    /// Scopes requested during authorization
    pub scopes: Vec<String>,
    /// Endpoint that receives the periodic post
    pub post_url: String,
    /// Address the callback server binds to
    pub listen_addr: String,
    /// Seconds subtracted from every token lifetime before refreshing
    pub refresh_buffer_secs: u64,
    /// Lifetime assumed for seeded tokens
    pub seed_expires_in_secs: u64,
    /// Timeout for every outbound HTTP request
    pub http_timeout_secs: u64,
    /// Seconds between periodic posts
    pub post_interval_secs: u64,
    /// Text published by the periodic task
    pub post_text: String,
    /// Seed access token
    pub access_token: Option<String>,
    /// Seed refresh token
    pub refresh_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: "https://x.com/i/oauth2/authorize".to_string(),
            token_url: "https://api.x.com/2/oauth2/token".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            scopes: ["tweet.read", "tweet.write", "users.read", "offline.access"]
                .into_iter()
                .map(String::from)
                .collect(),
            post_url: "https://api.x.com/2/tweets".to_string(),
            listen_addr: "127.0.0.1:3000".to_string(),
            refresh_buffer_secs: 300,
            seed_expires_in_secs: 3600,
            http_timeout_secs: 30,
            post_interval_secs: 60,
            post_text: "gm".to_string(),
            access_token: None,
            refresh_token: None,
        }
    }
}

impl Config {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "postbot", "postbot")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Apply `CLIENT_ID`, `CLIENT_SECRET`, `ACCESS_TOKEN` and `REFRESH_TOKEN`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = non_empty("CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = non_empty("CLIENT_SECRET") {
            self.client_secret = v;
        }
        if let Some(v) = non_empty("ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = non_empty("REFRESH_TOKEN") {
            self.refresh_token = Some(v);
        }
    }

    /// Reject configurations the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            bail!("client_id and client_secret are required (config file or CLIENT_ID/CLIENT_SECRET)");
        }
        for (name, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("redirect_uri", &self.redirect_uri),
            ("post_url", &self.post_url),
        ] {
            url::Url::parse(value).with_context(|| format!("Invalid {}: {}", name, value))?;
        }
        self.listen_addr()?;
        if self.post_interval_secs == 0 {
            bail!("post_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen_addr: {}", self.listen_addr))
    }

    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    /// Seed pair, when both tokens are configured.
    pub fn seed_pair(&self) -> Option<TokenPair> {
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(TokenPair::new(access.clone(), refresh.clone()))
            }
            _ => None,
        }
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval_secs)
    }

    /// Shared HTTP client for the token endpoint and the API.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }
}
