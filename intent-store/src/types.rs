//! Intent and session records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A named configuration steering the model for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// Normalized snake_case identifier, unique across the store
    pub name: String,
    /// Base system instruction
    pub prompt_template: String,
    /// Grounding content placed before the template when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alternate surface forms
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Created implicitly on first encounter rather than by an operator
    #[serde(default)]
    pub is_learning: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Intent {
    /// Create an operator-curated intent.
    pub fn new(name: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            prompt_template: prompt_template.into(),
            description: None,
            aliases: Vec::new(),
            is_learning: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an intent discovered by the resolver.
    pub fn learning(name: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            is_learning: true,
            ..Self::new(name, prompt_template)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = dedup_aliases(aliases.into_iter().map(Into::into));
        self
    }

    /// The system instruction sent to the model for this intent.
    ///
    /// A non-empty description comes first, followed by a blank line and the template.
    pub fn system_instruction(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => {
                format!("{}\n\n{}", description, self.prompt_template)
            }
            _ => self.prompt_template.clone(),
        }
    }

    /// Apply an operator update in place.
    pub fn apply(&mut self, update: IntentUpdate) {
        if let Some(template) = update.prompt_template {
            self.prompt_template = template;
        }
        if let Some(description) = update.description {
            self.description = if description.trim().is_empty() {
                None
            } else {
                Some(description)
            };
        }
        if let Some(aliases) = update.aliases {
            self.aliases = dedup_aliases(aliases.into_iter());
        }
        if let Some(is_learning) = update.is_learning {
            self.is_learning = is_learning;
        }
        self.updated_at = Utc::now();
    }
}

/// Trim, drop empties and keep the first occurrence of each alias.
fn dedup_aliases(aliases: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for alias in aliases {
        let alias = alias.trim().to_string();
        if !alias.is_empty() && !out.contains(&alias) {
            out.push(alias);
        }
    }
    out
}

/// Partial operator update. `None` leaves a field unchanged; an empty
/// description clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentUpdate {
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub is_learning: Option<bool>,
}

/// Speaker of a context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a session's rolling history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Whether the entry has no retainable content.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Rolling conversation memory for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub context: Vec<ContextEntry>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Check if the session has been idle longer than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(ttl, Utc::now())
    }

    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > ttl
    }

    /// Append entries and enforce the sliding window, then touch.
    pub fn append(&mut self, entries: impl IntoIterator<Item = ContextEntry>, max_len: usize) {
        self.context.extend(entries);
        apply_window(&mut self.context, max_len);
        self.updated_at = Utc::now();
    }
}

/// Drop blank entries and keep only the newest `max_len`, preserving order.
pub fn apply_window(context: &mut Vec<ContextEntry>, max_len: usize) {
    context.retain(|entry| !entry.is_blank());
    if context.len() > max_len {
        let excess = context.len() - max_len;
        context.drain(..excess);
    }
}
