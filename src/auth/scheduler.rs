//! Refresh scheduling
//!
//! Owns the single pending refresh timer and the single-refresh guard. Every
//! trigger (timer, forced refresh, 401 from the executor) funnels into
//! `begin_refresh`, which either starts one exchange task or hands back the
//! shared future of the one already running.
//!
//! All bookkeeping sits behind one `std::sync::Mutex` that is never held
//! across an await. Each install or clear of the token store bumps a
//! generation counter; timers and refresh tasks remember the generation they
//! were started for, so a late timer or a superseded refresh result is
//! discarded instead of clobbering newer tokens.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::error::AuthError;
use super::exchange::{TokenExchange, TokenResponse};
use super::tokens::{TokenState, TokenStore};

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No token has been installed yet.
    Idle,
    /// A refresh timer is pending.
    Armed,
    /// A refresh exchange is in flight.
    Refreshing,
    /// The last refresh failed; waiting for a new authorization.
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Armed => "armed",
            Phase::Refreshing => "refreshing",
            Phase::Failed => "failed",
        }
    }
}

/// Floor for the next timer after a successful refresh, so a provider that
/// keeps issuing tokens shorter than the buffer is not hammered.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(30);

type RefreshOutcome = Result<(), AuthError>;
type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

struct Inner {
    phase: Phase,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    in_flight: Option<InFlight>,
}

pub struct RefreshScheduler {
    store: Arc<TokenStore>,
    exchanger: Arc<dyn TokenExchange>,
    buffer: Duration,
    inner: Mutex<Inner>,
    this: Weak<RefreshScheduler>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<TokenStore>,
        exchanger: Arc<dyn TokenExchange>,
        buffer: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            exchanger,
            buffer,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                generation: 0,
                timer: None,
                in_flight: None,
            }),
            this: this.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Install tokens obtained outside the refresh path (startup seed or
    /// authorization code) and arm the timer for them.
    ///
    /// Valid from any phase, including `Failed`.
    pub fn install(&self, response: &TokenResponse) {
        if response.expires_in <= self.buffer.as_secs() {
            tracing::warn!(
                "Token lifetime ({}s) does not exceed the refresh buffer ({}s)",
                response.expires_in,
                self.buffer.as_secs()
            );
        }
        let state = TokenState::issue(response, Instant::now(), self.buffer);
        let deadline = state.expires_at;

        let mut inner = self.lock();
        inner.generation += 1;
        self.store.write(state);
        self.arm(&mut inner, deadline);
    }

    /// Refresh now, or join the refresh already in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        let in_flight = {
            let mut inner = self.lock();
            self.begin_refresh(&mut inner)
        };
        match in_flight {
            Some(outcome) => outcome.await,
            None => Err(AuthError::NotAuthenticated),
        }
    }

    /// Refresh after `rejected` was refused by the API.
    ///
    /// If the store already holds a different, live access token (another
    /// trigger refreshed in the meantime) no exchange is made.
    pub async fn refresh_rejected(&self, rejected: &str) -> RefreshOutcome {
        let (in_flight, joined) = {
            let mut inner = self.lock();
            let joined = inner.in_flight.is_some();
            if !joined {
                let superseded = self
                    .store
                    .read()
                    .is_some_and(|s| s.pair.access_token != rejected && s.is_live());
                if superseded {
                    tracing::debug!("Rejected token already replaced, skipping refresh");
                    return Ok(());
                }
            }
            (self.begin_refresh(&mut inner), joined)
        };
        let Some(outcome) = in_flight else {
            return Err(AuthError::NotAuthenticated);
        };
        outcome.await?;

        // A joined refresh may have been started for an older pair and
        // discarded when `rejected` was installed over it.
        if joined && self.store.access_token().as_deref() == Some(rejected) {
            tracing::debug!("Joined refresh did not replace the rejected token, refreshing again");
            return self.refresh().await;
        }
        Ok(())
    }

    /// Replace the pending timer with one firing at `deadline`, or refresh at
    /// once if the deadline has already passed.
    fn arm(&self, inner: &mut Inner, deadline: Instant) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.phase = Phase::Armed;

        if deadline <= Instant::now() {
            tracing::info!("Token already inside its refresh window, refreshing now");
            self.begin_refresh(inner);
            return;
        }

        let generation = inner.generation;
        let this = self.this.clone();
        tracing::debug!(
            "Next token refresh in {}s",
            deadline.saturating_duration_since(Instant::now()).as_secs()
        );
        inner.timer = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;
            if let Some(scheduler) = this.upgrade() {
                scheduler.on_timer(generation);
            }
        }));
    }

    fn on_timer(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.phase != Phase::Armed {
            tracing::debug!("Ignoring stale refresh timer");
            return;
        }
        // Detach rather than abort: this is the task currently running.
        inner.timer.take();
        tracing::info!("Refresh window reached, refreshing token");
        self.begin_refresh(&mut inner);
    }

    /// Start a refresh unless one is already running. Returns `None` when
    /// there is no refresh token to exchange.
    fn begin_refresh(&self, inner: &mut Inner) -> Option<InFlight> {
        if let Some(in_flight) = &inner.in_flight {
            tracing::debug!("Joining refresh already in flight");
            return Some(in_flight.clone());
        }

        let Some(state) = self.store.read() else {
            tracing::warn!("No refresh token available. Manual authentication required.");
            return None;
        };
        let this = self.this.upgrade()?;

        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.phase = Phase::Refreshing;

        let generation = inner.generation;
        let refresh_token = state.pair.refresh_token.clone();
        let task = tokio::spawn(async move { this.run_refresh(generation, refresh_token).await });

        let in_flight = task
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(AuthError::ExchangeFailed {
                        status: None,
                        body: format!("refresh task did not complete: {}", e),
                    })
                })
            })
            .boxed()
            .shared();
        inner.in_flight = Some(in_flight.clone());
        Some(in_flight)
    }

    async fn run_refresh(self: Arc<Self>, generation: u64, refresh_token: String) -> RefreshOutcome {
        let result = self.exchanger.exchange_refresh_token(&refresh_token).await;

        let mut inner = self.lock();
        inner.in_flight = None;

        if inner.generation != generation {
            tracing::info!("Tokens replaced while refreshing, discarding refresh result");
            let Some(state) = self.store.read() else {
                return Err(AuthError::NotAuthenticated);
            };
            // An install already inside its refresh window joined this
            // refresh instead of arming a timer; start its own now.
            if inner.timer.is_none() && inner.phase == Phase::Armed {
                self.arm(&mut inner, state.expires_at);
            }
            return Ok(());
        }

        match result {
            Ok(response) => {
                let now = Instant::now();
                let state = TokenState::issue(&response, now, self.buffer);
                let deadline = state.expires_at.max(now + MIN_REFRESH_DELAY);
                inner.generation += 1;
                self.store.write(state);
                tracing::info!("Token refresh successful");
                self.arm(&mut inner, deadline);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                tracing::warn!("Manual reauthentication required. Visit /auth endpoint.");
                inner.generation += 1;
                self.store.clear();
                if let Some(timer) = inner.timer.take() {
                    timer.abort();
                }
                inner.phase = Phase::Failed;
                Err(e)
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
    }
}
