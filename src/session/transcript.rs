use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Who spoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker name used when the conversation is rendered for prompt compilation
    pub fn speaker(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Picasso",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single attributed utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,

    pub content: String,

    /// When the utterance was received (Unix milliseconds on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl TranscriptMessage {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    fn dedup_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.role,
            self.content,
            self.timestamp.timestamp_millis().div_euclid(1000)
        )
    }
}

/// Caller-side conversation record
///
/// The realtime service can report the same utterance through more than one
/// event; entries repeating a recently seen (role, content, second) are
/// dropped.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    entries: Vec<TranscriptMessage>,
    recent: HashMap<String, DateTime<Utc>>,
    window: Duration,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::with_window(Duration::seconds(5))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: Vec::new(),
            recent: HashMap::new(),
            window,
        }
    }

    /// Record a message. Returns false if it was a recent duplicate.
    pub fn push(&mut self, message: TranscriptMessage) -> bool {
        let now = message.timestamp;
        let window = self.window;
        self.recent.retain(|_, seen| now - *seen < window);

        let key = message.dedup_key();
        if self.recent.contains_key(&key) {
            return false;
        }

        self.recent.insert(key, now);
        self.entries.push(message);
        true
    }

    pub fn entries(&self) -> &[TranscriptMessage] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recent.clear();
    }

    /// `Speaker: text` lines joined by newlines
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|m| format!("{}: {}", m.role.speaker(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}
