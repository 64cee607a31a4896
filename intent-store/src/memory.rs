//! In-process stores backed by `tokio::sync::RwLock<HashMap<..>>`.
//!
//! Used for tests and single-instance deployments. Every conditional write
//! happens under one write-lock acquisition, which makes it atomic within
//! the process.

use crate::traits::{IntentStore, SessionStore};
use crate::types::{ContextEntry, Intent, IntentUpdate, Session};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use intent_common::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory intent store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntentStore {
    intents: Arc<RwLock<HashMap<String, Intent>>>,
}

impl InMemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with intents.
    pub fn with_intents(intents: impl IntoIterator<Item = Intent>) -> Self {
        let map = intents
            .into_iter()
            .map(|intent| (intent.name.clone(), intent))
            .collect();
        Self {
            intents: Arc::new(RwLock::new(map)),
        }
    }

    async fn sorted(&self) -> Vec<Intent> {
        let mut intents: Vec<Intent> = self.intents.read().await.values().cloned().collect();
        intents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        intents
    }
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Intent>> {
        Ok(self.intents.read().await.get(name).cloned())
    }

    async fn find_all_names(&self) -> Result<Vec<String>> {
        Ok(self.sorted().await.into_iter().map(|i| i.name).collect())
    }

    async fn create_if_absent(&self, intent: Intent) -> Result<bool> {
        match self.intents.write().await.entry(intent.name.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(intent);
                Ok(true)
            }
        }
    }

    async fn list(&self) -> Result<Vec<Intent>> {
        Ok(self.sorted().await)
    }

    async fn update(&self, name: &str, update: IntentUpdate) -> Result<Option<Intent>> {
        let mut intents = self.intents.write().await;
        Ok(intents.get_mut(name).map(|intent| {
            intent.apply(update);
            intent.clone()
        }))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.intents.write().await.remove(name).is_some())
    }
}

/// In-memory session store with lazy expiry.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::seconds(3600))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|session| !session.is_expired(self.ttl))
            .cloned())
    }

    async fn create_empty(&self, id: &str) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id));
        if session.is_expired(self.ttl) {
            *session = Session::new(id);
        }
        Ok(session.clone())
    }

    async fn append_and_trim(
        &self,
        id: &str,
        entries: Vec<ContextEntry>,
        max_len: usize,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id));
        if session.is_expired(self.ttl) {
            session.context.clear();
        }
        session.append(entries, max_len);
        Ok(session.clone())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(self.ttl, now));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let store = InMemoryIntentStore::new();
        assert!(store.create_if_absent(Intent::learning("hoc_phi", "t1")).await.unwrap());
        assert!(!store.create_if_absent(Intent::learning("hoc_phi", "t2")).await.unwrap());

        let intent = store.find_by_name("hoc_phi").await.unwrap().unwrap();
        assert_eq!(intent.prompt_template, "t1");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_create_if_absent_single_winner() {
        let store = InMemoryIntentStore::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create_if_absent(Intent::learning("tuyen_sinh", format!("t{i}")))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.find_all_names().await.unwrap(), vec!["tuyen_sinh"]);
    }

    #[tokio::test]
    async fn create_reports_conflict() {
        let store = InMemoryIntentStore::new();
        store.create(Intent::new("hoc_phi", "t")).await.unwrap();
        let err = store.create(Intent::new("hoc_phi", "t")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn names_are_ordered_by_creation() {
        let mut first = Intent::new("zeta", "t");
        first.created_at = Utc::now() - Duration::seconds(10);
        let second = Intent::new("alpha", "t");
        let store = InMemoryIntentStore::with_intents([second, first]);

        assert_eq!(store.find_all_names().await.unwrap(), vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let store = InMemoryIntentStore::with_intents([Intent::new("hoc_phi", "t")]);
        let updated = store
            .update(
                "hoc_phi",
                IntentUpdate {
                    description: Some("X".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.system_instruction(), "X\n\nt");
        assert!(store.update("missing", IntentUpdate::default()).await.unwrap().is_none());

        assert!(store.delete("hoc_phi").await.unwrap());
        assert!(!store.delete("hoc_phi").await.unwrap());
    }

    #[tokio::test]
    async fn append_creates_and_windows() {
        let store = InMemorySessionStore::default();
        for i in 0..30 {
            store
                .append_and_trim(
                    "s1",
                    vec![ContextEntry::user(format!("q{i}")), ContextEntry::assistant(format!("a{i}"))],
                    40,
                )
                .await
                .unwrap();
        }

        let session = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(session.context.len(), 40);
        assert_eq!(session.context[0].content, "q10");
        assert_eq!(session.context[39].content, "a29");
    }

    #[tokio::test]
    async fn expired_sessions_are_absent() {
        let store = InMemorySessionStore::default();
        store
            .append_and_trim("old", vec![ContextEntry::user("hello")], 40)
            .await
            .unwrap();
        store.sessions.write().await.get_mut("old").unwrap().updated_at =
            Utc::now() - Duration::seconds(3601);

        assert!(store.find_by_id("old").await.unwrap().is_none());

        let fresh = store.create_empty("old").await.unwrap();
        assert!(fresh.context.is_empty());
    }

    #[tokio::test]
    async fn append_to_expired_session_starts_empty() {
        let store = InMemorySessionStore::default();
        store
            .append_and_trim("s", vec![ContextEntry::user("stale")], 40)
            .await
            .unwrap();
        store.sessions.write().await.get_mut("s").unwrap().updated_at =
            Utc::now() - Duration::seconds(7200);

        let session = store
            .append_and_trim("s", vec![ContextEntry::user("fresh")], 40)
            .await
            .unwrap();
        assert_eq!(session.context.len(), 1);
        assert_eq!(session.context[0].content, "fresh");
    }

    #[tokio::test]
    async fn create_empty_keeps_live_session() {
        let store = InMemorySessionStore::default();
        store
            .append_and_trim("s", vec![ContextEntry::user("keep me")], 40)
            .await
            .unwrap();
        let session = store.create_empty("s").await.unwrap();
        assert_eq!(session.context.len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemorySessionStore::default();
        store.create_empty("live").await.unwrap();
        store.create_empty("dead").await.unwrap();
        store.sessions.write().await.get_mut("dead").unwrap().updated_at =
            Utc::now() - Duration::hours(2);

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.find_by_id("live").await.unwrap().is_some());
    }
}
