//! Background purge of expired sessions.
//!
//! Reads already treat expired sessions as absent; the reaper only bounds
//! storage growth.

use crate::traits::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn a task that calls `purge_expired` every `every`.
///
/// The first purge runs immediately. Abort the returned handle on shutdown.
pub fn spawn_session_reaper(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(removed, backend = store.name(), "Purged expired sessions");
                }
                Err(e) => {
                    tracing::warn!(error = %e, backend = store.name(), "Session purge failed");
                }
            }
        }
    })
}
