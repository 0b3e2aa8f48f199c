//! Authenticated HTTP client
//!
//! Wraps reqwest::Client with bearer token injection. A 401 triggers one
//! reactive token refresh (joined with any refresh already running) and a
//! single retry with the new token.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response, StatusCode};

use crate::auth::{AuthError, TokenManager};

/// Retries allowed after a 401-triggered refresh.
const MAX_AUTH_RETRIES: u32 = 1;

pub struct AuthenticatedClient {
    http: reqwest::Client,
    manager: Arc<TokenManager>,
}

impl AuthenticatedClient {
    pub fn new(http: reqwest::Client, manager: Arc<TokenManager>) -> Self {
        Self { http, manager }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        &self.manager
    }

    /// POST a JSON body with bearer auth.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Response, AuthError> {
        let request = self
            .http
            .post(url)
            .json(body)
            .build()
            .map_err(|e| AuthError::RequestFailed {
                status: None,
                body: e.to_string(),
            })?;
        self.call(request).await
    }

    /// Execute `request` with the current access token.
    ///
    /// Fails with `NotAuthenticated` before touching the network when no
    /// token is held. Bodies that cannot be cloned are sent at most once.
    pub async fn call(&self, request: Request) -> Result<Response, AuthError> {
        let mut request = request;
        let mut retries_left = MAX_AUTH_RETRIES;

        loop {
            let token = self
                .manager
                .current_access_token()
                .ok_or(AuthError::NotAuthenticated)?;
            let retry = if retries_left > 0 {
                request.try_clone()
            } else {
                None
            };

            let method = request.method().clone();
            let url = request.url().clone();
            tracing::debug!("{} {}", method, url);

            let resp = self.send(request, &token).await?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            let body = resp.text().await.unwrap_or_default();
            if status != StatusCode::UNAUTHORIZED {
                tracing::warn!("HTTP {} for {} {}", status.as_u16(), method, url);
                return Err(AuthError::RequestFailed {
                    status: Some(status.as_u16()),
                    body,
                });
            }

            if retries_left == 0 {
                tracing::warn!("401 Unauthorized for {} {} after token refresh", method, url);
                return Err(AuthError::RetryExhausted);
            }

            tracing::info!("Token rejected for {} {}, attempting refresh...", method, url);
            self.manager.refresh_rejected(&token).await?;

            request = match retry {
                Some(copy) => copy,
                None => {
                    tracing::warn!("Request body cannot be replayed, not retrying");
                    return Err(AuthError::RequestFailed {
                        status: Some(status.as_u16()),
                        body,
                    });
                }
            };
            retries_left -= 1;
        }
    }

    async fn send(&self, mut request: Request, token: &str) -> Result<Response, AuthError> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                AuthError::RequestFailed {
                    status: None,
                    body: format!("access token is not a valid header value: {}", e),
                }
            })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        self.http
            .execute(request)
            .await
            .map_err(|e| AuthError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                body: e.to_string(),
            })
    }
}
