//! Enrichment queue model.
//!
//! # Invariants
//! - Tasks are processed in the fixed order `AssignMetadata` -> `SuggestNodes`
//!   -> `Embed`, regardless of which note they belong to.
//! - Status moves `Pending -> Processing -> Completed | Failed`; a deferred
//!   entry moves `Processing -> Pending` and records why.

use crate::model::{NoteId, QueueEntryId};
use serde::{Deserialize, Serialize};

/// Enrichment task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueTask {
    AssignMetadata,
    SuggestNodes,
    Embed,
}

impl QueueTask {
    /// Every task a finished note is enqueued with, in processing order.
    pub const ALL: [QueueTask; 3] = [
        QueueTask::AssignMetadata,
        QueueTask::SuggestNodes,
        QueueTask::Embed,
    ];

    /// Processing priority; lower runs first.
    pub fn priority(self) -> u8 {
        match self {
            Self::AssignMetadata => 1,
            Self::SuggestNodes => 2,
            Self::Embed => 3,
        }
    }

    pub fn as_db(self) -> &'static str {
        match self {
            Self::AssignMetadata => "assign_metadata",
            Self::SuggestNodes => "suggest_nodes",
            Self::Embed => "embed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "assign_metadata" => Some(Self::AssignMetadata),
            "suggest_nodes" => Some(Self::SuggestNodes),
            "embed" => Some(Self::Embed),
            _ => None,
        }
    }

    /// Upper-case label used in user-facing listings.
    pub fn label(self) -> &'static str {
        match self {
            Self::AssignMetadata => "ASSIGN_METADATA",
            Self::SuggestNodes => "SUGGEST_NODES",
            Self::Embed => "EMBED",
        }
    }
}

/// Queue entry lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

/// One enrichment task for one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub note_id: NoteId,
    pub task: QueueTask,
    pub status: QueueStatus,
    /// Human-readable reason for the last failure or deferral.
    pub status_details: Option<String>,
    /// Number of times the collaborator was unavailable for this entry.
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Sorts entries into processing order: task priority first, then queue
/// insertion order. Entries of one note keep their relative task order while
/// different notes interleave by priority.
pub fn sort_for_processing(entries: &mut [QueueEntry]) {
    entries.sort_by_key(|entry| (entry.task.priority(), entry.id));
}
