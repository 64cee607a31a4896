//! SQLite-backed intent and session stores.
//!
//! One database file holds both tables. The connection sits behind a mutex
//! and every call runs on the blocking pool. Conditional writes are single
//! statements (`INSERT OR IGNORE`) or `IMMEDIATE` transactions, so they stay
//! atomic even when several processes share the file.

use crate::traits::{IntentStore, SessionStore};
use crate::types::{ContextEntry, Intent, IntentUpdate, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use intent_common::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS intents (
    name TEXT PRIMARY KEY,
    prompt_template TEXT NOT NULL,
    description TEXT,
    aliases TEXT NOT NULL DEFAULT '[]',
    is_learning INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    context TEXT NOT NULL DEFAULT '[]',
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at);
"#;

fn storage_err(err: impl std::fmt::Display) -> Error {
    Error::Storage(err.to_string())
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Shared handle to the database.
#[derive(Clone)]
pub struct SqliteDb {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDb {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(storage_err)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::Storage(format!("Failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| Error::Storage(format!("connection lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {e}")))?
    }
}

// ============================================================================
// Intents
// ============================================================================

/// SQLite intent store.
#[derive(Clone)]
pub struct SqliteIntentStore {
    db: SqliteDb,
}

impl SqliteIntentStore {
    pub fn new(db: SqliteDb) -> Self {
        Self { db }
    }
}

const INTENT_COLUMNS: &str =
    "name, prompt_template, description, aliases, is_learning, created_at, updated_at";

fn intent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Intent> {
    let aliases_json: String = row.get(3)?;
    Ok(Intent {
        name: row.get(0)?,
        prompt_template: row.get(1)?,
        description: row.get(2)?,
        aliases: serde_json::from_str(&aliases_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        is_learning: row.get(4)?,
        created_at: millis_to_datetime(row.get(5)?),
        updated_at: millis_to_datetime(row.get(6)?),
    })
}

fn get_intent(conn: &Connection, name: &str) -> Result<Option<Intent>> {
    conn.query_row(
        &format!("SELECT {INTENT_COLUMNS} FROM intents WHERE name = ?1"),
        params![name],
        intent_from_row,
    )
    .optional()
    .map_err(storage_err)
}

#[async_trait]
impl IntentStore for SqliteIntentStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Intent>> {
        let name = name.to_string();
        self.db.call(move |conn| get_intent(conn, &name)).await
    }

    async fn find_all_names(&self) -> Result<Vec<String>> {
        self.db
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM intents ORDER BY created_at, name")
                    .map_err(storage_err)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(storage_err)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
            })
            .await
    }

    async fn create_if_absent(&self, intent: Intent) -> Result<bool> {
        let aliases = serde_json::to_string(&intent.aliases)?;
        self.db
            .call(move |conn| {
                let inserted = conn
                    .execute(
                        &format!(
                            "INSERT OR IGNORE INTO intents ({INTENT_COLUMNS}) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                        ),
                        params![
                            intent.name,
                            intent.prompt_template,
                            intent.description,
                            aliases,
                            intent.is_learning,
                            intent.created_at.timestamp_millis(),
                            intent.updated_at.timestamp_millis(),
                        ],
                    )
                    .map_err(storage_err)?;
                Ok(inserted == 1)
            })
            .await
    }

    async fn list(&self) -> Result<Vec<Intent>> {
        self.db
            .call(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {INTENT_COLUMNS} FROM intents ORDER BY created_at, name"
                    ))
                    .map_err(storage_err)?;
                let rows = stmt.query_map([], intent_from_row).map_err(storage_err)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
            })
            .await
    }

    async fn update(&self, name: &str, update: IntentUpdate) -> Result<Option<Intent>> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(storage_err)?;
                let Some(mut intent) = get_intent(&tx, &name)? else {
                    return Ok(None);
                };
                intent.apply(update);
                tx.execute(
                    "UPDATE intents SET prompt_template = ?1, description = ?2, aliases = ?3, \
                     is_learning = ?4, updated_at = ?5 WHERE name = ?6",
                    params![
                        intent.prompt_template,
                        intent.description,
                        serde_json::to_string(&intent.aliases)?,
                        intent.is_learning,
                        intent.updated_at.timestamp_millis(),
                        intent.name,
                    ],
                )
                .map_err(storage_err)?;
                tx.commit().map_err(storage_err)?;
                Ok(Some(intent))
            })
            .await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                let rows = conn
                    .execute("DELETE FROM intents WHERE name = ?1", params![name])
                    .map_err(storage_err)?;
                Ok(rows > 0)
            })
            .await
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// SQLite session store.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: SqliteDb,
    ttl: Duration,
}

impl SqliteSessionStore {
    pub fn new(db: SqliteDb, ttl: Duration) -> Self {
        Self { db, ttl }
    }
}

fn cutoff_millis(ttl: Duration) -> i64 {
    Utc::now()
        .checked_sub_signed(ttl)
        .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis())
}

/// Load a session row, treating rows older than `cutoff` as absent.
fn get_live_session(conn: &Connection, id: &str, cutoff: i64) -> Result<Option<Session>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT context, updated_at FROM sessions WHERE id = ?1 AND updated_at >= ?2",
            params![id, cutoff],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(storage_err)?;

    row.map(|(context, updated_at)| -> Result<Session> {
        Ok(Session {
            id: id.to_string(),
            context: serde_json::from_str(&context)?,
            updated_at: millis_to_datetime(updated_at),
        })
    })
    .transpose()
}

fn put_session(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, context, updated_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(id) DO UPDATE SET context = excluded.context, updated_at = excluded.updated_at",
        params![
            session.id,
            serde_json::to_string(&session.context)?,
            session.updated_at.timestamp_millis(),
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        let cutoff = cutoff_millis(self.ttl);
        self.db
            .call(move |conn| get_live_session(conn, &id, cutoff))
            .await
    }

    async fn create_empty(&self, id: &str) -> Result<Session> {
        let id = id.to_string();
        let cutoff = cutoff_millis(self.ttl);
        self.db
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(storage_err)?;
                let session = match get_live_session(&tx, &id, cutoff)? {
                    Some(existing) => existing,
                    None => {
                        let fresh = Session::new(id);
                        put_session(&tx, &fresh)?;
                        fresh
                    }
                };
                tx.commit().map_err(storage_err)?;
                Ok(session)
            })
            .await
    }

    async fn append_and_trim(
        &self,
        id: &str,
        entries: Vec<ContextEntry>,
        max_len: usize,
    ) -> Result<Session> {
        let id = id.to_string();
        let cutoff = cutoff_millis(self.ttl);
        self.db
            .call(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(storage_err)?;
                let mut session =
                    get_live_session(&tx, &id, cutoff)?.unwrap_or_else(|| Session::new(id));
                session.append(entries, max_len);
                put_session(&tx, &session)?;
                tx.commit().map_err(storage_err)?;
                Ok(session)
            })
            .await
    }

    async fn purge_expired(&self) -> Result<usize> {
        let cutoff = cutoff_millis(self.ttl);
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM sessions WHERE updated_at < ?1", params![cutoff])
                    .map_err(storage_err)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn stores() -> (SqliteIntentStore, SqliteSessionStore, SqliteDb) {
        let db = SqliteDb::open_in_memory().unwrap();
        (
            SqliteIntentStore::new(db.clone()),
            SqliteSessionStore::new(db.clone(), Duration::seconds(3600)),
            db,
        )
    }

    async fn backdate(db: &SqliteDb, id: &str, secs: i64) {
        let id = id.to_string();
        let at = (Utc::now() - Duration::seconds(secs)).timestamp_millis();
        db.call(move |conn| {
            conn.execute("UPDATE sessions SET updated_at = ?1 WHERE id = ?2", params![at, id])
                .map_err(storage_err)?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn intent_roundtrip_preserves_fields() {
        let (intents, _, _) = stores();
        let intent = Intent::new("hoc_phi", "Y")
            .with_description("X")
            .with_aliases(["học phí", "tuition"]);
        assert!(intents.create_if_absent(intent.clone()).await.unwrap());

        let loaded = intents.find_by_name("hoc_phi").await.unwrap().unwrap();
        assert_eq!(loaded.prompt_template, "Y");
        assert_eq!(loaded.description.as_deref(), Some("X"));
        assert_eq!(loaded.aliases, vec!["học phí", "tuition"]);
        assert!(!loaded.is_learning);
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            intent.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn insert_or_ignore_keeps_first() {
        let (intents, _, _) = stores();
        assert!(intents.create_if_absent(Intent::learning("x", "first")).await.unwrap());
        assert!(!intents.create_if_absent(Intent::learning("x", "second")).await.unwrap());
        let loaded = intents.find_by_name("x").await.unwrap().unwrap();
        assert_eq!(loaded.prompt_template, "first");
        assert!(loaded.is_learning);
    }

    #[tokio::test]
    async fn concurrent_create_single_winner() {
        let (intents, _, _) = stores();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let intents = intents.clone();
                tokio::spawn(async move {
                    intents
                        .create_if_absent(Intent::learning("nganh_hoc", "t"))
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            winners += usize::from(handle.await.unwrap());
        }
        assert_eq!(winners, 1);
        assert_eq!(intents.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_list_delete() {
        let (intents, _, _) = stores();
        intents.create(Intent::new("b", "t")).await.unwrap();
        intents.create(Intent::new("a", "t")).await.unwrap();

        let updated = intents
            .update(
                "a",
                IntentUpdate {
                    aliases: Some(vec!["alpha".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.aliases, vec!["alpha"]);
        assert!(intents.update("zzz", IntentUpdate::default()).await.unwrap().is_none());

        assert_eq!(intents.list().await.unwrap().len(), 2);
        assert!(intents.delete("a").await.unwrap());
        assert_eq!(intents.find_all_names().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn sessions_append_and_window() {
        let (_, sessions, _) = stores();
        for i in 0..25 {
            sessions
                .append_and_trim(
                    "s1",
                    vec![ContextEntry::user(format!("q{i}")), ContextEntry::assistant(format!("a{i}"))],
                    40,
                )
                .await
                .unwrap();
        }
        let session = sessions.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(session.context.len(), 40);
        assert_eq!(session.context[0].content, "q5");
        assert_eq!(session.context[39].content, "a24");
    }

    #[tokio::test]
    async fn expired_session_is_absent_and_purged() {
        let (_, sessions, db) = stores();
        sessions
            .append_and_trim("old", vec![ContextEntry::user("hi")], 40)
            .await
            .unwrap();
        sessions.create_empty("live").await.unwrap();
        backdate(&db, "old", 3601).await;

        assert!(sessions.find_by_id("old").await.unwrap().is_none());
        assert!(sessions.find_by_id("live").await.unwrap().is_some());
        assert_eq!(sessions.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn create_empty_resets_expired_only() {
        let (_, sessions, db) = stores();
        sessions
            .append_and_trim("s", vec![ContextEntry::user("keep")], 40)
            .await
            .unwrap();
        assert_eq!(sessions.create_empty("s").await.unwrap().context.len(), 1);

        backdate(&db, "s", 7200).await;
        assert!(sessions.create_empty("s").await.unwrap().context.is_empty());
    }

    #[tokio::test]
    async fn corrupt_aliases_surface_as_error() {
        let (intents, _, db) = stores();
        intents.create(Intent::new("hoc_phi", "t")).await.unwrap();
        db.call(|conn| {
            conn.execute("UPDATE intents SET aliases = 'not json' WHERE name = 'hoc_phi'", [])
                .map_err(storage_err)?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(intents.find_by_name("hoc_phi").await.is_err());
        assert!(intents.list().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_pairs_contiguous() {
        const TURNS: usize = 10;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent-chat.db");
        // Two handles on one file so writers contend on the database lock.
        let handles = [
            SqliteSessionStore::new(SqliteDb::open(&path).unwrap(), Duration::seconds(3600)),
            SqliteSessionStore::new(SqliteDb::open(&path).unwrap(), Duration::seconds(3600)),
        ];

        let tasks: Vec<_> = (0..TURNS)
            .map(|i| {
                let sessions = handles[i % 2].clone();
                tokio::spawn(async move {
                    sessions
                        .append_and_trim(
                            "shared",
                            vec![ContextEntry::user(format!("q{i}")), ContextEntry::assistant(format!("a{i}"))],
                            2 * TURNS,
                        )
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let session = handles[0].find_by_id("shared").await.unwrap().unwrap();
        assert_eq!(session.context.len(), 2 * TURNS);
        let mut seen = std::collections::HashSet::new();
        for pair in session.context.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            let turn = pair[0].content.trim_start_matches('q');
            assert_eq!(pair[1].content, format!("a{turn}"));
            assert!(seen.insert(turn.to_string()));
        }
        assert_eq!(seen.len(), TURNS);
    }

    #[tokio::test]
    async fn file_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("intent-chat.db");
        {
            let db = SqliteDb::open(&path).unwrap();
            SqliteIntentStore::new(db)
                .create(Intent::new("hoc_phi", "t"))
                .await
                .unwrap();
        }
        let db = SqliteDb::open(&path).unwrap();
        let names = SqliteIntentStore::new(db).find_all_names().await.unwrap();
        assert_eq!(names, vec!["hoc_phi"]);
    }
}
