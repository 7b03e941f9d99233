//! Note aggregate: a note, its ordered snippets and their token sets.
//!
//! # Invariants
//! - A snippet belongs to exactly one note.
//! - Note-level token sets are distinct from snippet-level sets; the
//!   user-facing view is always their union (`tags_all`, `entities_all`,
//!   `times_all`).
//! - `active=false` is a soft-delete tombstone.

use crate::model::time::TimeEntry;
use crate::model::{NoteId, SnippetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Note row without its snippets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub active: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// One line/paragraph of user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: SnippetId,
    pub note_id: NoteId,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub tags: BTreeSet<String>,
    pub entities: BTreeSet<String>,
    pub times: BTreeSet<TimeEntry>,
}

/// Fully loaded note aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDetail {
    pub note: Note,
    /// Ordered by creation.
    pub snippets: Vec<Snippet>,
    /// Note-level tags only.
    pub tags: BTreeSet<String>,
    /// Note-level entities only.
    pub entities: BTreeSet<String>,
    pub urls: BTreeSet<String>,
    /// Note-level times only.
    pub times: BTreeSet<TimeEntry>,
    /// Linked locations in path notation, sorted.
    pub locations: Vec<String>,
}

impl NoteDetail {
    /// Note-level tags plus the tags of every snippet.
    pub fn tags_all(&self) -> BTreeSet<String> {
        let mut all = self.tags.clone();
        for snippet in &self.snippets {
            all.extend(snippet.tags.iter().cloned());
        }
        all
    }

    /// Note-level entities plus the entities of every snippet.
    pub fn entities_all(&self) -> BTreeSet<String> {
        let mut all = self.entities.clone();
        for snippet in &self.snippets {
            all.extend(snippet.entities.iter().cloned());
        }
        all
    }

    /// Note-level times plus the times of every snippet.
    pub fn times_all(&self) -> BTreeSet<TimeEntry> {
        let mut all = self.times.clone();
        for snippet in &self.snippets {
            all.extend(snippet.times.iter().cloned());
        }
        all
    }

    /// Snippet contents joined by newlines; the text sent for enrichment.
    pub fn text(&self) -> String {
        self.snippets
            .iter()
            .map(|snippet| snippet.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the snippet at a 1-based position.
    pub fn snippet_at(&self, ordinal: usize) -> Option<&Snippet> {
        ordinal
            .checked_sub(1)
            .and_then(|index| self.snippets.get(index))
    }
}
