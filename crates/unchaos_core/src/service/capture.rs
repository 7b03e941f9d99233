//! Interactive note capture.
//!
//! # Responsibility
//! - Hold a new note and its snippets inside one open transaction while the
//!   user types.
//! - End the session explicitly: commit and enqueue, or roll back.
//!
//! # Invariants
//! - Nothing typed during a session is visible to other connections until
//!   `finish(CaptureOutcome::Commit)`.
//! - A session dropped without `finish` rolls back, so an interrupted
//!   process leaves no partial note.
//! - Committing a session that captured nothing stores nothing.

use crate::extract::has_content;
use crate::model::NoteId;
use crate::repo::note_repo::SqliteNoteRepository;
use crate::repo::queue_repo::SqliteQueueRepository;
use crate::repo::RepoError;
use crate::service::note_service::{AddSnippetOutcome, NoteService, NoteServiceError};
use crate::service::queue_service::{QueueError, QueueService};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};

/// Input line that abandons the session.
pub const DISCARD_COMMAND: &str = ":discard";
/// Input line that ends the session and saves it.
pub const SAVE_COMMAND: &str = ":save";

#[derive(Debug)]
pub enum CaptureError {
    Io(std::io::Error),
    Note(NoteServiceError),
    Queue(QueueError),
    Repo(RepoError),
}

impl Display for CaptureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "capture input failed: {err}"),
            Self::Note(err) => write!(f, "{err}"),
            Self::Queue(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Note(err) => Some(err),
            Self::Queue(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<NoteServiceError> for CaptureError {
    fn from(value: NoteServiceError) -> Self {
        Self::Note(value)
    }
}

impl From<QueueError> for CaptureError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

impl From<RepoError> for CaptureError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for CaptureError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

/// How the user ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Commit,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResult {
    /// Note stored; `enqueued` enrichment entries were created.
    Saved { note: NoteId, enqueued: usize },
    Discarded,
    /// Session ended without any input.
    Empty,
}

/// One open capture transaction.
pub struct CaptureSession<'conn> {
    tx: Transaction<'conn>,
    note: NoteId,
    captured: usize,
}

impl<'conn> CaptureSession<'conn> {
    /// Opens the transaction and creates the note inside it.
    pub fn begin(conn: &'conn mut Connection, title: Option<&str>) -> Result<Self, CaptureError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let note = NoteService::new(SqliteNoteRepository::try_new(&tx)?)
            .create_note(title)?
            .id;
        Ok(Self {
            tx,
            note,
            captured: 0,
        })
    }

    pub fn note(&self) -> NoteId {
        self.note
    }

    /// Adds one input line. Lines without content, such as blanks or a bare
    /// `#`, are ignored and return `None`.
    pub fn add_line(&mut self, line: &str) -> Result<Option<AddSnippetOutcome>, CaptureError> {
        if !has_content(line) {
            return Ok(None);
        }
        let outcome = NoteService::new(SqliteNoteRepository::try_new(&self.tx)?)
            .add_snippet(self.note, line)?;
        self.captured += 1;
        Ok(Some(outcome))
    }

    /// Ends the session.
    pub fn finish(self, outcome: CaptureOutcome) -> Result<CaptureResult, CaptureError> {
        if outcome == CaptureOutcome::Discard {
            self.tx.rollback()?;
            info!("event=capture_finish module=capture status=discarded");
            return Ok(CaptureResult::Discarded);
        }
        if self.captured == 0 {
            self.tx.rollback()?;
            info!("event=capture_finish module=capture status=empty");
            return Ok(CaptureResult::Empty);
        }

        let enqueued = QueueService::new(
            SqliteQueueRepository::try_new(&self.tx)?,
            SqliteNoteRepository::try_new(&self.tx)?,
        )
        .enqueue(self.note)?;
        self.tx.commit()?;
        info!(
            "event=capture_finish module=capture status=ok note_id={} lines={} enqueued={enqueued}",
            self.note, self.captured
        );
        Ok(CaptureResult::Saved {
            note: self.note,
            enqueued,
        })
    }
}

/// Feeds lines from `input` into `session` until end of input or a control
/// line, echoing a short acknowledgement for tags-only lines to `output`.
///
/// End of input and [`SAVE_COMMAND`] commit; [`DISCARD_COMMAND`] discards.
pub fn read_capture_input<R: BufRead, W: Write>(
    session: &mut CaptureSession<'_>,
    input: R,
    mut output: W,
) -> Result<CaptureOutcome, CaptureError> {
    for line in input.lines() {
        let line = line?;
        match line.trim() {
            DISCARD_COMMAND => return Ok(CaptureOutcome::Discard),
            SAVE_COMMAND => return Ok(CaptureOutcome::Commit),
            _ => {}
        }
        if let Some(AddSnippetOutcome::TagsMerged { tags }) = session.add_line(&line)? {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            writeln!(output, "  tagged: {}", tags.join(", "))?;
        }
    }
    Ok(CaptureOutcome::Commit)
}
