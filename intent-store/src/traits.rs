//! Storage traits for intents and sessions.
//!
//! Both traits expose atomic conditional writes (`create_if_absent`,
//! `append_and_trim`) so callers never need a separate existence check or a
//! load-modify-save cycle.

use crate::types::{ContextEntry, Intent, IntentUpdate, Session};
use async_trait::async_trait;
use intent_common::{Error, Result};

/// Persistence for named intent configurations.
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite")
    fn name(&self) -> &str;

    /// Get an intent by its normalized name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Intent>>;

    /// All intent names, oldest first.
    async fn find_all_names(&self) -> Result<Vec<String>>;

    /// Insert the intent unless one with the same name exists.
    ///
    /// Returns true if this call inserted it. Exactly one of several
    /// concurrent callers with the same name observes true.
    async fn create_if_absent(&self, intent: Intent) -> Result<bool>;

    /// All intents, oldest first.
    async fn list(&self) -> Result<Vec<Intent>>;

    /// Apply a partial update. Returns the updated intent, or None if absent.
    async fn update(&self, name: &str, update: IntentUpdate) -> Result<Option<Intent>>;

    /// Delete an intent. Returns true if it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Insert a new intent, failing with `Conflict` if the name is taken.
    async fn create(&self, intent: Intent) -> Result<Intent> {
        if self.create_if_absent(intent.clone()).await? {
            Ok(intent)
        } else {
            Err(Error::Conflict(format!("Intent '{}' already exists", intent.name)))
        }
    }
}

/// Persistence for per-session rolling history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite")
    fn name(&self) -> &str;

    /// Get a live session. Expired records are reported as None.
    async fn find_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Ensure an empty session exists under `id`.
    ///
    /// A live session with that id is returned unchanged; an expired one is
    /// reset to empty.
    async fn create_empty(&self, id: &str) -> Result<Session>;

    /// Atomically append entries, drop blank ones, keep the newest `max_len`
    /// and touch `updated_at`. A missing or expired session starts empty.
    async fn append_and_trim(
        &self,
        id: &str,
        entries: Vec<ContextEntry>,
        max_len: usize,
    ) -> Result<Session>;

    /// Delete expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
