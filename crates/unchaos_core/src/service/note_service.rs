//! Note use-case service.
//!
//! # Responsibility
//! - Turn raw user text into snippets with linked tokens.
//! - Manage note lifecycle: title, archive/restore, confirmed hard delete.
//! - Keep custom fields and embeddings as validated JSON.
//!
//! # Invariants
//! - Blank input and bare markers never create a snippet.
//! - Snippets of archived notes are read-only.
//! - Note-level times are extracted from user-supplied titles only.
//! - Tags-only input (`#a #b`) merges into the note's own tag set and
//!   creates no snippet.
//! - Snippet ordinals are 1-based and resolved against creation order.
//! - A declined delete confirmation changes nothing.

use crate::extract::{extract, has_content, is_tags_only, Extracted};
use crate::model::note::{Note, NoteDetail};
use crate::model::token::TokenKind;
use crate::model::{NoteId, SnippetId};
use crate::repo::note_repo::{NoteListQuery, NoteRepository};
use crate::repo::RepoError;
use crate::search::{SearchFilter, SearchOutcome};
use chrono::{Local, NaiveDateTime};
use log::info;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum NoteServiceError {
    /// Input rejected before touching storage.
    Validation(String),
    NoteNotFound(NoteId),
    /// Snippet writes require an active note.
    NoteArchived(NoteId),
    SnippetOrdinalOutOfRange {
        note: NoteId,
        ordinal: usize,
        count: usize,
    },
    /// Stored or supplied custom field JSON is malformed.
    InvalidCustomFields(String),
    Repo(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::NoteArchived(id) => write!(f, "note {id} is archived; restore it first"),
            Self::SnippetOrdinalOutOfRange {
                note,
                ordinal,
                count,
            } => write!(
                f,
                "note {note} has {count} snippet(s); snippet {ordinal} does not exist"
            ),
            Self::InvalidCustomFields(message) => write!(f, "invalid custom fields: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NoteNotFound(id) => Self::NoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// What happened to one piece of input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddSnippetOutcome {
    /// Input was tags only; these tags were merged into the note.
    TagsMerged { tags: BTreeSet<String> },
    /// A snippet was appended.
    SnippetAdded {
        snippet: SnippetId,
        extracted: Extracted,
    },
}

/// Which notes a delete applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteSelector {
    Ids(Vec<NoteId>),
    /// Exact title, or a pattern where `*` matches any run of characters.
    Title(String),
}

/// How a destructive operation is confirmed.
pub enum Confirmation<'a> {
    /// Proceed without asking.
    Skip,
    /// Ask with the affected notes; `true` proceeds.
    Ask(&'a mut dyn FnMut(&[Note]) -> bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Vec<NoteId>),
    Declined,
    NothingMatched,
}

/// Default title for a note created without one.
pub fn default_title(now: NaiveDateTime) -> String {
    format!("untitled ({})", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository> {
    repo: R,
}

impl<R: NoteRepository> NoteService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates an empty note. A missing or blank title gets a timestamped
    /// default.
    pub fn create_note(&self, title: Option<&str>) -> Result<Note, NoteServiceError> {
        let id = match title.map(str::trim) {
            Some(title) if !title.is_empty() => {
                self.repo.create_note(title, &extract(title).times)?
            }
            _ => {
                let title = default_title(Local::now().naive_local());
                self.repo.create_note(&title, &[])?
            }
        };
        info!("event=note_create module=note status=ok note_id={id}");
        self.require_note(id)
    }

    pub fn get_note(&self, id: NoteId) -> Result<NoteDetail, NoteServiceError> {
        self.repo
            .load_detail(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    /// Active notes, or all notes when `include_archived`, newest first.
    pub fn list_notes(&self, include_archived: bool) -> Result<Vec<Note>, NoteServiceError> {
        Ok(self.repo.list_notes(NoteListQuery { include_archived })?)
    }

    /// Runs extraction on `text` and stores the result.
    pub fn add_snippet(&self, note: NoteId, text: &str) -> Result<AddSnippetOutcome, NoteServiceError> {
        let text = require_text(text)?;
        if !has_content(text) {
            return Err(NoteServiceError::Validation(
                "snippet text has no content".to_string(),
            ));
        }
        self.require_active(note)?;
        let extracted = extract(text);

        if is_tags_only(text) {
            self.repo
                .merge_note_tokens(note, TokenKind::Tag, &extracted.tags)?;
            info!(
                "event=snippet_add module=note status=ok note_id={note} kind=tags_only tag_count={}",
                extracted.tags.len()
            );
            return Ok(AddSnippetOutcome::TagsMerged {
                tags: extracted.tags,
            });
        }

        let snippet = self.repo.add_snippet(note, text, &extracted)?;
        info!(
            "event=snippet_add module=note status=ok note_id={note} snippet_id={snippet} tag_count={} entity_count={} url_count={} time_count={}",
            extracted.tags.len(),
            extracted.entities.len(),
            extracted.urls.len(),
            extracted.times.len()
        );
        Ok(AddSnippetOutcome::SnippetAdded { snippet, extracted })
    }

    /// Replaces the content of the snippet at 1-based `ordinal`.
    pub fn edit_snippet(
        &self,
        note: NoteId,
        ordinal: usize,
        text: &str,
    ) -> Result<Extracted, NoteServiceError> {
        let text = require_text(text)?;
        self.require_active(note)?;
        let snippet = self.snippet_id_at(note, ordinal)?;
        let extracted = extract(text);
        self.repo.replace_snippet(snippet, text, &extracted)?;
        info!("event=snippet_edit module=note status=ok note_id={note} snippet_id={snippet}");
        Ok(extracted)
    }

    /// Deletes the snippet at 1-based `ordinal`.
    pub fn delete_snippet(&self, note: NoteId, ordinal: usize) -> Result<(), NoteServiceError> {
        self.require_active(note)?;
        let snippet = self.snippet_id_at(note, ordinal)?;
        self.repo.delete_snippet(snippet)?;
        info!("event=snippet_delete module=note status=ok note_id={note} snippet_id={snippet}");
        Ok(())
    }

    pub fn set_title(&self, note: NoteId, title: &str) -> Result<(), NoteServiceError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(NoteServiceError::Validation(
                "title cannot be blank".to_string(),
            ));
        }
        self.repo.set_title(note, title, &extract(title).times)?;
        info!("event=note_title module=note status=ok note_id={note}");
        Ok(())
    }

    /// Soft-deletes a note.
    pub fn archive(&self, note: NoteId) -> Result<(), NoteServiceError> {
        self.repo.set_active(note, false)?;
        info!("event=note_archive module=note status=ok note_id={note}");
        Ok(())
    }

    pub fn restore(&self, note: NoteId) -> Result<(), NoteServiceError> {
        self.repo.set_active(note, true)?;
        info!("event=note_restore module=note status=ok note_id={note}");
        Ok(())
    }

    /// Hard-deletes the selected notes after confirmation.
    ///
    /// Unknown ids abort before asking. Tokens and time entries are kept.
    pub fn delete_notes(
        &self,
        selector: &NoteSelector,
        confirmation: Confirmation<'_>,
    ) -> Result<DeleteOutcome, NoteServiceError> {
        let targets = match selector {
            NoteSelector::Ids(ids) => ids
                .iter()
                .map(|&id| self.require_note(id))
                .collect::<Result<Vec<_>, _>>()?,
            NoteSelector::Title(pattern) => self.repo.find_by_title(pattern)?,
        };
        if targets.is_empty() {
            return Ok(DeleteOutcome::NothingMatched);
        }

        if let Confirmation::Ask(confirm) = confirmation {
            if !confirm(&targets) {
                info!(
                    "event=note_delete module=note status=declined count={}",
                    targets.len()
                );
                return Ok(DeleteOutcome::Declined);
            }
        }

        let ids: Vec<NoteId> = targets.iter().map(|note| note.id).collect();
        let removed = self.repo.delete_notes(&ids)?;
        info!("event=note_delete module=note status=ok count={removed}");
        Ok(DeleteOutcome::Deleted(ids))
    }

    /// ANDed exact-match search over active notes.
    pub fn search(&self, filter: &SearchFilter) -> Result<SearchOutcome, NoteServiceError> {
        Ok(self.repo.search(filter)?)
    }

    /// Unions collaborator-proposed tags and entities into the note-level
    /// sets. Returns the number of newly created links.
    pub fn merge_metadata(
        &self,
        note: NoteId,
        tags: &BTreeSet<String>,
        entities: &BTreeSet<String>,
    ) -> Result<usize, NoteServiceError> {
        let linked = self.repo.merge_note_tokens(note, TokenKind::Tag, tags)?
            + self
                .repo
                .merge_note_tokens(note, TokenKind::Entity, entities)?;
        info!("event=metadata_merge module=note status=ok note_id={note} linked={linked}");
        Ok(linked)
    }

    /// Custom fields as a JSON object; empty when none were set.
    pub fn custom_fields(&self, note: NoteId) -> Result<Map<String, Value>, NoteServiceError> {
        match self.repo.custom_fields(note)? {
            None => Ok(Map::new()),
            Some(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err(NoteServiceError::InvalidCustomFields(format!(
                    "stored custom fields of note {note} are not a JSON object"
                ))),
                Err(err) => Err(NoteServiceError::InvalidCustomFields(err.to_string())),
            },
        }
    }

    /// Sets one custom field from JSON text (`"42"`, `"\"text\""`,
    /// `"[1,2]"`). The text is parsed as data only.
    pub fn set_custom_field(
        &self,
        note: NoteId,
        key: &str,
        json: &str,
    ) -> Result<(), NoteServiceError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(NoteServiceError::Validation(
                "custom field name cannot be blank".to_string(),
            ));
        }
        let value: Value = serde_json::from_str(json)
            .map_err(|err| NoteServiceError::InvalidCustomFields(format!("`{key}`: {err}")))?;

        let mut fields = self.custom_fields(note)?;
        fields.insert(key.to_string(), value);
        let text = Value::Object(fields).to_string();
        self.repo.set_custom_fields(note, &text)?;
        info!("event=custom_field_set module=note status=ok note_id={note}");
        Ok(())
    }

    pub fn set_embedding(&self, note: NoteId, vector: &[f32]) -> Result<(), NoteServiceError> {
        let text = serde_json::to_string(vector)
            .map_err(|err| NoteServiceError::Validation(format!("cannot encode embedding: {err}")))?;
        self.repo.set_embedding(note, &text)?;
        info!(
            "event=embedding_set module=note status=ok note_id={note} dimensions={}",
            vector.len()
        );
        Ok(())
    }

    pub fn embedding(&self, note: NoteId) -> Result<Option<Vec<f32>>, NoteServiceError> {
        self.repo
            .embedding(note)?
            .map(|text| {
                serde_json::from_str(&text).map_err(|err| {
                    NoteServiceError::Repo(RepoError::InvalidData(format!(
                        "embedding of note {note}: {err}"
                    )))
                })
            })
            .transpose()
    }

    fn require_note(&self, id: NoteId) -> Result<Note, NoteServiceError> {
        self.repo
            .get_note(id)?
            .ok_or(NoteServiceError::NoteNotFound(id))
    }

    fn require_active(&self, id: NoteId) -> Result<Note, NoteServiceError> {
        let note = self.require_note(id)?;
        if !note.active {
            return Err(NoteServiceError::NoteArchived(id));
        }
        Ok(note)
    }

    fn snippet_id_at(&self, note: NoteId, ordinal: usize) -> Result<SnippetId, NoteServiceError> {
        let detail = self.get_note(note)?;
        detail
            .snippet_at(ordinal)
            .map(|snippet| snippet.id)
            .ok_or(NoteServiceError::SnippetOrdinalOutOfRange {
                note,
                ordinal,
                count: detail.snippets.len(),
            })
    }
}

fn require_text(text: &str) -> Result<&str, NoteServiceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NoteServiceError::Validation(
            "snippet text cannot be blank".to_string(),
        ));
    }
    Ok(trimmed)
}
