//! Intent Store - persistence for intents and chat sessions.
//!
//! Two backends implement the same traits:
//! - In-memory maps for tests and single-instance runs
//! - SQLite for durable storage shared across restarts
//!
//! Sessions expire lazily on read; `spawn_session_reaper` purges them in the
//! background.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod memory;
pub mod reaper;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use memory::{InMemoryIntentStore, InMemorySessionStore};
pub use reaper::spawn_session_reaper;
pub use sqlite::{SqliteDb, SqliteIntentStore, SqliteSessionStore};
pub use traits::{IntentStore, SessionStore};
pub use types::{apply_window, ContextEntry, Intent, IntentUpdate, Role, Session};
