//! Enrichment queue use cases and the task processor.
//!
//! # Responsibility
//! - Enqueue the fixed task set for a note and inspect or clear the queue.
//! - Drain pending entries through an [`EnrichmentProvider`] and write the
//!   results back.
//!
//! # Invariants
//! - Entries run in `(task priority, entry id)` order.
//! - The `Processing` mark is committed before the collaborator is called.
//! - A task result and its `Completed` mark commit together.
//! - An unusable response fails only its own entry; an unreachable
//!   collaborator puts the entry back to `Pending` and ends the run.

use crate::db::unit_of_work;
use crate::model::queue::{sort_for_processing, QueueEntry, QueueStatus, QueueTask};
use crate::model::{NoteId, QueueEntryId};
use crate::provider::{EnrichmentProvider, ProviderError};
use crate::repo::location_repo::SqliteLocationRepository;
use crate::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use crate::repo::queue_repo::{QueueRepository, SqliteQueueRepository};
use crate::repo::RepoError;
use crate::service::location_service::{LocationError, LocationService};
use crate::service::note_service::{NoteService, NoteServiceError};
use log::{error, info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

#[derive(Debug)]
pub enum QueueError {
    /// Note does not exist or is archived.
    NoteNotFound(NoteId),
    Note(NoteServiceError),
    Location(LocationError),
    Repo(RepoError),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoteNotFound(id) => write!(f, "active note not found: {id}"),
            Self::Note(err) => write!(f, "{err}"),
            Self::Location(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueueError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Note(err) => Some(err),
            Self::Location(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NoteNotFound(_) => None,
        }
    }
}

impl From<RepoError> for QueueError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NoteNotFound(id) => Self::NoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<NoteServiceError> for QueueError {
    fn from(value: NoteServiceError) -> Self {
        Self::Note(value)
    }
}

impl From<LocationError> for QueueError {
    fn from(value: LocationError) -> Self {
        Self::Location(value)
    }
}

/// Queue facade over note and queue repositories.
pub struct QueueService<Q: QueueRepository, N: NoteRepository> {
    queue: Q,
    notes: N,
}

impl<Q: QueueRepository, N: NoteRepository> QueueService<Q, N> {
    pub fn new(queue: Q, notes: N) -> Self {
        Self { queue, notes }
    }

    /// Enqueues every task for `note`, skipping tasks already open for it.
    /// Returns the number of entries inserted.
    pub fn enqueue(&self, note: NoteId) -> Result<usize, QueueError> {
        match self.notes.get_note(note)? {
            Some(found) if found.active => {}
            _ => return Err(QueueError::NoteNotFound(note)),
        }
        let inserted = self.queue.enqueue(note, &QueueTask::ALL)?;
        info!("event=queue_enqueue module=queue status=ok note_id={note} inserted={inserted}");
        Ok(inserted)
    }

    pub fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.queue.list(status)?)
    }

    /// Removes every entry regardless of status.
    pub fn clear(&self) -> Result<usize, QueueError> {
        let removed = self.queue.clear()?;
        info!("event=queue_clear module=queue status=ok removed={removed}");
        Ok(removed)
    }
}

/// Outcome of one drain run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    /// Entries marked failed, with the stored reason.
    pub failed: Vec<(QueueEntryId, String)>,
    /// Entry that stopped the run because the collaborator was unreachable.
    pub stopped: Option<(QueueEntryId, String)>,
}

impl DrainReport {
    pub fn processed(&self) -> usize {
        self.completed + self.failed.len()
    }
}

enum TaskFailure {
    /// Entry is marked failed; the run continues.
    Rejected(String),
    /// Entry goes back to pending; the run stops.
    Unavailable(String),
    /// Storage or invariant failure; the run aborts.
    Fatal(QueueError),
}

impl From<ProviderError> for TaskFailure {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Invalid(reason) => Self::Rejected(reason),
            ProviderError::Unavailable(cause) => Self::Unavailable(cause),
        }
    }
}

impl From<QueueError> for TaskFailure {
    fn from(value: QueueError) -> Self {
        Self::Fatal(value)
    }
}

impl From<NoteServiceError> for TaskFailure {
    fn from(value: NoteServiceError) -> Self {
        Self::Fatal(value.into())
    }
}

impl From<LocationError> for TaskFailure {
    fn from(value: LocationError) -> Self {
        Self::Fatal(value.into())
    }
}

/// Drains the queue through one provider.
pub struct TaskProcessor<'a, P: EnrichmentProvider + ?Sized> {
    conn: &'a Connection,
    provider: &'a P,
    queue: SqliteQueueRepository<'a>,
    notes: NoteService<SqliteNoteRepository<'a>>,
    locations: LocationService<SqliteLocationRepository<'a>>,
}

impl<'a, P: EnrichmentProvider + ?Sized> TaskProcessor<'a, P> {
    pub fn try_new(conn: &'a Connection, provider: &'a P) -> Result<Self, QueueError> {
        Ok(Self {
            conn,
            provider,
            queue: SqliteQueueRepository::try_new(conn)?,
            notes: NoteService::new(SqliteNoteRepository::try_new(conn)?),
            locations: LocationService::new(SqliteLocationRepository::try_new(conn)?),
        })
    }

    /// Processes every pending entry in priority order.
    ///
    /// Entries left in `Processing` by an interrupted run are returned to
    /// `Pending` first.
    ///
    /// # Errors
    /// Storage failures and location invariant violations abort the run.
    /// The entry being processed is marked failed on a best-effort basis.
    pub fn drain(&self) -> Result<DrainReport, QueueError> {
        for stale in self.queue.list(Some(QueueStatus::Processing))? {
            self.queue
                .mark(stale.id, QueueStatus::Pending, Some("interrupted run"))?;
        }

        let mut entries = self.queue.list(Some(QueueStatus::Pending))?;
        sort_for_processing(&mut entries);
        let started_at = Instant::now();
        let mut report = DrainReport::default();

        for entry in &entries {
            self.queue.mark(entry.id, QueueStatus::Processing, None)?;
            match self.process(entry) {
                Ok(()) => {
                    report.completed += 1;
                    info!(
                        "event=task_run module=queue status=ok entry_id={} note_id={} task={}",
                        entry.id,
                        entry.note_id,
                        entry.task.as_db()
                    );
                }
                Err(TaskFailure::Rejected(reason)) => {
                    self.queue
                        .mark(entry.id, QueueStatus::Failed, Some(&reason))?;
                    warn!(
                        "event=task_run module=queue status=error error_code=rejected entry_id={} task={}",
                        entry.id,
                        entry.task.as_db()
                    );
                    report.failed.push((entry.id, reason));
                }
                Err(TaskFailure::Unavailable(cause)) => {
                    self.queue.defer(entry.id, &cause)?;
                    warn!(
                        "event=task_run module=queue status=deferred error_code=unavailable entry_id={} task={}",
                        entry.id,
                        entry.task.as_db()
                    );
                    report.stopped = Some((entry.id, cause));
                    break;
                }
                Err(TaskFailure::Fatal(err)) => {
                    error!(
                        "event=task_run module=queue status=error error_code=fatal entry_id={} task={}",
                        entry.id,
                        entry.task.as_db()
                    );
                    if let Err(mark_err) =
                        self.queue
                            .mark(entry.id, QueueStatus::Failed, Some(&err.to_string()))
                    {
                        error!(
                            "event=task_mark module=queue status=error entry_id={} error={mark_err}",
                            entry.id
                        );
                    }
                    return Err(err);
                }
            }
        }

        info!(
            "event=queue_drain module=queue status={} completed={} failed={} duration_ms={}",
            if report.stopped.is_some() { "stopped" } else { "ok" },
            report.completed,
            report.failed.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn process(&self, entry: &QueueEntry) -> Result<(), TaskFailure> {
        let note = entry.note_id;
        let detail = match self.notes.get_note(note) {
            Ok(detail) => detail,
            Err(NoteServiceError::NoteNotFound(_)) => {
                return Err(TaskFailure::Rejected("note no longer exists".to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        if !detail.note.active {
            return Err(TaskFailure::Rejected("note is archived".to_string()));
        }

        let text = detail.text();
        if text.trim().is_empty() {
            return Err(TaskFailure::Rejected("note has no snippet text".to_string()));
        }

        match entry.task {
            QueueTask::AssignMetadata => {
                let (tags, entities) = self.provider.assign_metadata(&text)?.into_token_sets();
                self.complete(entry, || {
                    self.notes.merge_metadata(note, &tags, &entities)?;
                    Ok(())
                })
            }
            QueueTask::SuggestNodes => {
                let roots = self.locations.root_names()?;
                let paths = self.provider.suggest_nodes(&text, &roots)?.validate()?;
                self.complete(entry, || {
                    for segments in &paths {
                        let ensured = self.locations.ensure_path(segments)?;
                        self.locations.link_note(note, ensured.node)?;
                    }
                    Ok(())
                })
            }
            QueueTask::Embed => {
                let vector = self.provider.embed(&text)?;
                if vector.is_empty() {
                    return Err(TaskFailure::Rejected("empty embedding vector".to_string()));
                }
                self.complete(entry, || {
                    self.notes.set_embedding(note, &vector)?;
                    Ok(())
                })
            }
        }
    }

    /// Writes a task result and the `Completed` mark in one unit of work.
    fn complete<F>(&self, entry: &QueueEntry, write: F) -> Result<(), TaskFailure>
    where
        F: FnOnce() -> Result<(), QueueError>,
    {
        unit_of_work(self.conn, |_| {
            write()?;
            self.queue.mark(entry.id, QueueStatus::Completed, None)?;
            Ok::<(), QueueError>(())
        })
        .map_err(TaskFailure::Fatal)
    }
}
