//! Enrichment queue persistence.
//!
//! # Invariants
//! - At most one open (`pending`/`processing`) entry per `(note, task)`,
//!   enforced by a partial unique index; enqueue uses `INSERT OR IGNORE`.
//! - Every status write bumps `updated_at`.

use crate::db::unit_of_work;
use crate::model::queue::{QueueEntry, QueueStatus, QueueTask};
use crate::model::{NoteId, QueueEntryId};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const ENTRY_COLUMNS: &str =
    "id, note_id, task, status, status_details, attempts, created_at, updated_at";

/// Repository interface for queue entries.
pub trait QueueRepository {
    /// Inserts entries for `tasks`, skipping open duplicates. Returns the
    /// number inserted.
    fn enqueue(&self, note: NoteId, tasks: &[QueueTask]) -> RepoResult<usize>;
    /// Lists entries in insertion order, optionally by status.
    fn list(&self, status: Option<QueueStatus>) -> RepoResult<Vec<QueueEntry>>;
    /// Sets status and details.
    fn mark(
        &self,
        id: QueueEntryId,
        status: QueueStatus,
        details: Option<&str>,
    ) -> RepoResult<()>;
    /// Returns a processing entry to pending and counts the attempt.
    fn defer(&self, id: QueueEntryId, details: &str) -> RepoResult<()>;
    /// Deletes every entry. Returns the number removed.
    fn clear(&self) -> RepoResult<usize>;
}

/// SQLite-backed queue repository.
pub struct SqliteQueueRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteQueueRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[(
                "queue",
                &[
                    "id",
                    "note_id",
                    "task",
                    "status",
                    "status_details",
                    "attempts",
                    "created_at",
                    "updated_at",
                ],
            )],
        )?;
        Ok(Self { conn })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn enqueue(&self, note: NoteId, tasks: &[QueueTask]) -> RepoResult<usize> {
        unit_of_work(self.conn, |conn| {
            let mut inserted = 0;
            for task in tasks {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO queue (note_id, task) VALUES (?1, ?2);",
                    params![note, task.as_db()],
                )?;
            }
            Ok(inserted)
        })
    }

    fn list(&self, status: Option<QueueStatus>) -> RepoResult<Vec<QueueEntry>> {
        let mut entries = Vec::new();
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM queue WHERE status = ?1 ORDER BY id ASC;"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query([status.as_db()])?;
                while let Some(row) = rows.next()? {
                    entries.push(parse_entry_row(row)?);
                }
            }
            None => {
                let sql = format!("SELECT {ENTRY_COLUMNS} FROM queue ORDER BY id ASC;");
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    entries.push(parse_entry_row(row)?);
                }
            }
        }
        Ok(entries)
    }

    fn mark(
        &self,
        id: QueueEntryId,
        status: QueueStatus,
        details: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE queue
             SET status = ?2,
                 status_details = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, status.as_db(), details],
        )?;
        if changed == 0 {
            return Err(RepoError::QueueEntryNotFound(id));
        }
        Ok(())
    }

    fn defer(&self, id: QueueEntryId, details: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE queue
             SET status = 'pending',
                 status_details = ?2,
                 attempts = attempts + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, details],
        )?;
        if changed == 0 {
            return Err(RepoError::QueueEntryNotFound(id));
        }
        Ok(())
    }

    fn clear(&self) -> RepoResult<usize> {
        Ok(self.conn.execute("DELETE FROM queue;", [])?)
    }
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<QueueEntry> {
    let task: String = row.get("task")?;
    let status: String = row.get("status")?;
    Ok(QueueEntry {
        id: row.get("id")?,
        note_id: row.get("note_id")?,
        task: QueueTask::from_db(&task)
            .ok_or_else(|| RepoError::InvalidData(format!("invalid queue.task `{task}`")))?,
        status: QueueStatus::from_db(&status)
            .ok_or_else(|| RepoError::InvalidData(format!("invalid queue.status `{status}`")))?,
        status_details: row.get("status_details")?,
        attempts: row.get("attempts")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
