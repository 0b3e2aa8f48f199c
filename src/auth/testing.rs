//! Scripted token exchanger for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::error::AuthError;
use super::exchange::{TokenExchange, TokenResponse};

pub fn token_response(access: &str, refresh: &str, expires_in: u64) -> TokenResponse {
    TokenResponse {
        token_type: Some("bearer".to_string()),
        expires_in,
        access_token: access.to_string(),
        scope: Some("tweet.read tweet.write users.read offline.access".to_string()),
        refresh_token: refresh.to_string(),
    }
}

/// Counts refresh exchanges and answers from a script.
///
/// With an empty script the n-th refresh succeeds with `A{n+1}`/`R{n+1}`
/// (so the first refresh of a pair seeded as `A1` yields `A2`). A gated
/// exchanger parks every refresh until [`ScriptedExchanger::release`].
pub struct ScriptedExchanger {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<Result<TokenResponse, AuthError>>>,
    gate: Option<Semaphore>,
    last_refresh_token: Mutex<Option<String>>,
    codes: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedExchanger {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            gate: None,
            last_refresh_token: Mutex::new(None),
            codes: Mutex::new(Vec::new()),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn push_failure(&self, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(AuthError::ExchangeFailed {
                status: Some(status),
                body: body.to_string(),
            }));
    }

    pub fn push_success(&self, response: TokenResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    /// Let one parked refresh proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }

    /// `(code, redirect_uri, code_verifier)` of every authorization-code exchange.
    pub fn codes(&self) -> Vec<(String, String, String)> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchange for ScriptedExchanger {
    async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.codes.lock().unwrap().push((
            code.to_string(),
            redirect_uri.to_string(),
            code_verifier.to_string(),
        ));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(token_response("B1", "S1", 3600)))
    }

    async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(token_response(
                &format!("A{}", n + 1),
                &format!("R{}", n + 1),
                3600,
            ))
        })
    }
}
