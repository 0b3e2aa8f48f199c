//! Periodic publishing task
//!
//! Fires on a fixed interval. Cycles never overlap: a slow cycle delays the
//! next tick instead of stacking. Without a live token the cycle is skipped;
//! the process keeps running until someone authorizes again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::api::{self, AuthenticatedClient, PostData};
use crate::auth::AuthError;

#[derive(Debug)]
pub enum CycleOutcome {
    Skipped,
    Published(PostData),
    Failed(AuthError),
}

/// Run one publishing cycle.
pub async fn run_cycle(client: &AuthenticatedClient, url: &str, text: &str) -> CycleOutcome {
    let manager = client.manager();
    if !manager.is_authenticated() {
        tracing::info!(
            "Not authenticated (token state: {}), skipping this cycle",
            manager.phase().as_str()
        );
        return CycleOutcome::Skipped;
    }

    match api::publish(client, url, text).await {
        Ok(post) => CycleOutcome::Published(post),
        Err(AuthError::NotAuthenticated) => {
            tracing::info!("Authentication required, skipping this cycle");
            CycleOutcome::Skipped
        }
        Err(e) => {
            tracing::warn!("Publishing failed: {}", e);
            CycleOutcome::Failed(e)
        }
    }
}

/// Spawn the periodic task. The first cycle runs one interval from now.
pub fn spawn(
    client: Arc<AuthenticatedClient>,
    url: String,
    text: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // skip first immediate tick

        loop {
            ticker.tick().await;
            tracing::debug!("Running publishing cycle");
            if let CycleOutcome::Published(post) = run_cycle(&client, &url, &text).await {
                tracing::debug!("Cycle published {}", post.text);
            }
        }
    })
}
