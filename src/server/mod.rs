//! Callback server
//!
//! `/auth` sends the user to the provider, `/callback` receives the
//! authorization code and hands it to the token manager, `/status` reports
//! the token state and `/refresh` forces a refresh.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{Authorizer, Phase, TokenManager};

#[derive(Clone)]
pub struct ServerState {
    pub manager: Arc<TokenManager>,
    pub authorizer: Arc<Authorizer>,
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/auth", get(authorize))
        .route("/callback", get(callback))
        .route("/status", get(status))
        .route("/refresh", post(refresh))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Callback server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Callback server failed")
}

async fn authorize(State(state): State<ServerState>) -> Redirect {
    let url = state.authorizer.begin();
    Redirect::to(url.as_str())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<ServerState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    if let Some(error) = params.error {
        tracing::warn!("Provider returned authorization error: {}", error);
        return (StatusCode::BAD_REQUEST, "Authorization was denied.");
    }
    let (Some(code), Some(csrf)) = (params.code, params.state) else {
        return (StatusCode::BAD_REQUEST, "Missing code or state.");
    };
    let Some(verifier) = state.authorizer.take_verifier(&csrf) else {
        tracing::warn!("Callback with unknown or expired state");
        return (
            StatusCode::BAD_REQUEST,
            "Unknown or expired authorization state.",
        );
    };

    match state
        .manager
        .complete_authorization(&code, state.authorizer.redirect_uri(), verifier.secret())
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            "Authentication successful! You can close this window.",
        ),
        Err(e) => {
            tracing::error!("Error during authentication: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed!")
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    authenticated: bool,
    phase: Phase,
    expires_at: Option<String>,
}

async fn status(State(state): State<ServerState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        authenticated: state.manager.is_authenticated(),
        phase: state.manager.phase(),
        expires_at: state.manager.expires_at().map(|t| t.to_rfc3339()),
    })
}

async fn refresh(State(state): State<ServerState>) -> (StatusCode, Json<StatusResponse>) {
    let code = if state.manager.force_refresh().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, status(State(state)).await)
}
