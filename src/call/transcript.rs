//! Per-call transcript log
//!
//! Append-only during the call; a flush cursor tracks which entries have
//! already been persisted so periodic flushes only upload the delta.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Caller,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Assistant => "assistant",
        }
    }
}

/// One transcript line
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered transcript for one call
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    flushed: usize,
}

impl TranscriptLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry with the current timestamp
    pub fn append(&mut self, role: Role, text: &str) {
        self.entries.push(TranscriptEntry {
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// All entries in chronological order
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Entries appended since the last successful flush
    #[must_use]
    pub fn pending(&self) -> &[TranscriptEntry] {
        &self.entries[self.flushed..]
    }

    /// Advance the flush cursor past everything currently pending
    pub fn mark_flushed(&mut self) {
        self.flushed = self.entries.len();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the whole conversation as plain text, one line per entry
    #[must_use]
    pub fn full_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role.as_str(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_chronological_order() {
        let mut log = TranscriptLog::new();
        log.append(Role::Assistant, "Bom dia!");
        log.append(Role::Caller, "quem fala?");
        log.append(Role::Assistant, "Aqui é da recepção.");

        let roles: Vec<Role> = log.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Caller, Role::Assistant]);
        assert_eq!(log.entries()[0].text, "Bom dia!");
        assert_eq!(log.entries()[2].text, "Aqui é da recepção.");
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);
    }

    #[test]
    fn flush_cursor_tracks_pending_entries() {
        let mut log = TranscriptLog::new();
        assert!(log.pending().is_empty());

        log.append(Role::Caller, "alô");
        assert_eq!(log.pending().len(), 1);

        log.mark_flushed();
        assert!(log.pending().is_empty());

        // Flushing twice with nothing new is safe
        log.mark_flushed();
        assert!(log.pending().is_empty());

        log.append(Role::Assistant, "olá");
        assert_eq!(log.pending().len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn full_text_labels_speakers() {
        let mut log = TranscriptLog::new();
        log.append(Role::Caller, "quanto custa isso");
        log.append(Role::Assistant, "Depende do plano.");
        assert_eq!(
            log.full_text(),
            "caller: quanto custa isso\nassistant: Depende do plano."
        );
    }

    #[test]
    fn entry_serializes_camel_case() {
        let entry = TranscriptEntry {
            role: Role::Caller,
            text: "oi".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""role":"caller""#));
        assert!(json.contains(r#""timestamp""#));
    }
}
