//! Note/snippet repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist notes and their ordered snippets.
//! - Own token/time link replacement for snippets with atomic semantics.
//! - Assemble the full `NoteDetail` read model.
//!
//! # Invariants
//! - Snippet writes replace that snippet's tag/entity/time links in the same
//!   unit of work as the content change.
//! - URLs are linked at note level only. `note_urls` always equals the URLs
//!   of the note's current snippets, so edits and deletes recompute it.
//! - Note-level times come from the note title and are replaced with it.
//! - Every snippet write touches the owning note's `updated_at`.
//! - Deleting a note cascades to snippets, link rows, queue rows and location
//!   links, but never to `tokens` or `times`.

use crate::db::unit_of_work;
use crate::extract::{extract_urls, Extracted};
use crate::model::note::{Note, NoteDetail, Snippet};
use crate::model::time::TimeEntry;
use crate::model::token::TokenKind;
use crate::model::{NoteId, SnippetId};
use crate::repo::location_repo::note_location_paths;
use crate::repo::token_repo::{parse_time_row, TokenStore};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use crate::search::{search_notes, SearchFilter, SearchOutcome};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

/// Column list matching [`parse_note_row`].
pub(crate) const NOTE_COLUMNS: &str = "id, title, active, created_at, updated_at";

const TOUCH_NOTE_SQL: &str = "UPDATE notes
     SET updated_at = (strftime('%s', 'now') * 1000)
     WHERE id = ?1;";

/// Query options for note listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteListQuery {
    /// Include soft-deleted (`active=false`) notes.
    pub include_archived: bool,
}

/// Repository interface for the note aggregate.
pub trait NoteRepository {
    /// Inserts a note with the times found in its title.
    fn create_note(&self, title: &str, times: &[TimeEntry]) -> RepoResult<NoteId>;
    /// Gets one note row, archived or not.
    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Loads the note with its snippets, token sets and locations.
    fn load_detail(&self, id: NoteId) -> RepoResult<Option<NoteDetail>>;
    /// Lists notes, newest first.
    fn list_notes(&self, query: NoteListQuery) -> RepoResult<Vec<Note>>;
    /// Renames a note and replaces its note-level times.
    fn set_title(&self, id: NoteId, title: &str, times: &[TimeEntry]) -> RepoResult<()>;
    fn set_active(&self, id: NoteId, active: bool) -> RepoResult<()>;
    /// Appends a snippet and links its extracted tokens.
    fn add_snippet(
        &self,
        note: NoteId,
        content: &str,
        extracted: &Extracted,
    ) -> RepoResult<SnippetId>;
    /// Replaces snippet content and its token links.
    fn replace_snippet(
        &self,
        snippet: SnippetId,
        content: &str,
        extracted: &Extracted,
    ) -> RepoResult<()>;
    fn delete_snippet(&self, snippet: SnippetId) -> RepoResult<()>;
    /// Links values of `kind` to the note itself. Returns newly linked count.
    fn merge_note_tokens(
        &self,
        note: NoteId,
        kind: TokenKind,
        values: &BTreeSet<String>,
    ) -> RepoResult<usize>;
    /// Finds notes by exact title, or by `*` wildcard pattern.
    fn find_by_title(&self, pattern: &str) -> RepoResult<Vec<Note>>;
    /// Hard-deletes notes. Returns the number of rows removed.
    fn delete_notes(&self, ids: &[NoteId]) -> RepoResult<usize>;
    /// Raw JSON text of the note's custom fields.
    fn custom_fields(&self, id: NoteId) -> RepoResult<Option<String>>;
    fn set_custom_fields(&self, id: NoteId, json: &str) -> RepoResult<()>;
    /// Raw JSON text of the note's embedding vector.
    fn embedding(&self, id: NoteId) -> RepoResult<Option<String>>;
    fn set_embedding(&self, id: NoteId, json: &str) -> RepoResult<()>;
    /// ANDed exact-match filter over active notes.
    fn search(&self, filter: &SearchFilter) -> RepoResult<SearchOutcome>;
}

/// SQLite-backed note repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
    tokens: TokenStore<'conn>,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                (
                    "notes",
                    &[
                        "id",
                        "title",
                        "active",
                        "custom_fields",
                        "embedding",
                        "created_at",
                        "updated_at",
                    ],
                ),
                (
                    "snippets",
                    &["id", "note_id", "content", "created_at", "updated_at"],
                ),
                ("note_tags", &["note_id", "token_id"]),
                ("snippet_tags", &["snippet_id", "token_id"]),
                ("note_entities", &["note_id", "token_id"]),
                ("snippet_entities", &["snippet_id", "token_id"]),
                ("note_urls", &["note_id", "token_id"]),
                ("note_times", &["note_id", "time_id"]),
                ("snippet_times", &["snippet_id", "time_id"]),
            ],
        )?;
        Ok(Self {
            conn,
            tokens: TokenStore::try_new(conn)?,
        })
    }

    fn link_snippet(&self, conn: &Connection, snippet: SnippetId, extracted: &Extracted) -> RepoResult<()> {
        for (kind, values) in [
            (TokenKind::Tag, &extracted.tags),
            (TokenKind::Entity, &extracted.entities),
        ] {
            let Some(table) = kind.snippet_table() else {
                continue;
            };
            let sql = format!("INSERT OR IGNORE INTO {table} (snippet_id, token_id) VALUES (?1, ?2);");
            for value in values {
                let token = self.tokens.get_or_create(value)?;
                conn.execute(&sql, params![snippet, token.id])?;
            }
        }

        for entry in &extracted.times {
            let time = self.tokens.get_or_create_time(entry)?;
            conn.execute(
                "INSERT OR IGNORE INTO snippet_times (snippet_id, time_id) VALUES (?1, ?2);",
                params![snippet, time],
            )?;
        }
        Ok(())
    }

    fn link_note(
        &self,
        conn: &Connection,
        note: NoteId,
        kind: TokenKind,
        values: &BTreeSet<String>,
    ) -> RepoResult<usize> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (note_id, token_id) VALUES (?1, ?2);",
            kind.note_table()
        );
        let mut linked = 0;
        for value in values {
            let token = self.tokens.get_or_create(value)?;
            linked += conn.execute(&sql, params![note, token.id])?;
        }
        Ok(linked)
    }

    fn link_note_times(
        &self,
        conn: &Connection,
        note: NoteId,
        times: &[TimeEntry],
    ) -> RepoResult<()> {
        conn.execute("DELETE FROM note_times WHERE note_id = ?1;", [note])?;
        for entry in times {
            let time = self.tokens.get_or_create_time(entry)?;
            conn.execute(
                "INSERT OR IGNORE INTO note_times (note_id, time_id) VALUES (?1, ?2);",
                params![note, time],
            )?;
        }
        Ok(())
    }

    /// Rebuilds `note_urls` from the note's remaining snippets.
    fn relink_note_urls(&self, conn: &Connection, note: NoteId) -> RepoResult<()> {
        conn.execute("DELETE FROM note_urls WHERE note_id = ?1;", [note])?;
        let mut stmt = conn.prepare("SELECT content FROM snippets WHERE note_id = ?1;")?;
        let mut rows = stmt.query([note])?;
        let mut urls = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let content: String = row.get(0)?;
            urls.extend(extract_urls(&content));
        }
        self.link_note(conn, note, TokenKind::Url, &urls)?;
        Ok(())
    }

    fn load_snippets(&self, note: NoteId) -> RepoResult<Vec<Snippet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_id, content, created_at, updated_at
             FROM snippets
             WHERE note_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([note])?;
        let mut snippets = Vec::new();
        while let Some(row) = rows.next()? {
            let id: SnippetId = row.get("id")?;
            snippets.push(Snippet {
                id,
                note_id: row.get("note_id")?,
                content: row.get("content")?,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
                tags: linked_values(self.conn, "snippet_tags", "snippet_id", id.0)?,
                entities: linked_values(self.conn, "snippet_entities", "snippet_id", id.0)?,
                times: linked_times(self.conn, "snippet_times", "snippet_id", id.0)?,
            });
        }
        Ok(snippets)
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn create_note(&self, title: &str, times: &[TimeEntry]) -> RepoResult<NoteId> {
        unit_of_work(self.conn, |conn| {
            conn.execute("INSERT INTO notes (title) VALUES (?1);", [title])?;
            let note = NoteId(conn.last_insert_rowid());
            self.link_note_times(conn, note, times)?;
            Ok(note)
        })
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_note_row(row)?)),
            None => Ok(None),
        }
    }

    fn load_detail(&self, id: NoteId) -> RepoResult<Option<NoteDetail>> {
        let Some(note) = self.get_note(id)? else {
            return Ok(None);
        };

        Ok(Some(NoteDetail {
            snippets: self.load_snippets(id)?,
            tags: linked_values(self.conn, TokenKind::Tag.note_table(), "note_id", id.0)?,
            entities: linked_values(self.conn, TokenKind::Entity.note_table(), "note_id", id.0)?,
            urls: linked_values(self.conn, TokenKind::Url.note_table(), "note_id", id.0)?,
            times: linked_times(self.conn, "note_times", "note_id", id.0)?,
            locations: note_location_paths(self.conn, id)?,
            note,
        }))
    }

    fn list_notes(&self, query: NoteListQuery) -> RepoResult<Vec<Note>> {
        let filter = if query.include_archived {
            ""
        } else {
            "WHERE active = 1"
        };
        let sql = format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             {filter}
             ORDER BY created_at DESC, id DESC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn set_title(&self, id: NoteId, title: &str, times: &[TimeEntry]) -> RepoResult<()> {
        unit_of_work(self.conn, |conn| {
            let changed = conn.execute(
                "UPDATE notes
                 SET title = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![id, title],
            )?;
            require_changed(changed, id)?;
            self.link_note_times(conn, id, times)
        })
    }

    fn set_active(&self, id: NoteId, active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET active = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, active],
        )?;
        require_changed(changed, id)
    }

    fn add_snippet(
        &self,
        note: NoteId,
        content: &str,
        extracted: &Extracted,
    ) -> RepoResult<SnippetId> {
        unit_of_work(self.conn, |conn| {
            let changed = conn.execute(TOUCH_NOTE_SQL, [note])?;
            require_changed(changed, note)?;

            conn.execute(
                "INSERT INTO snippets (note_id, content) VALUES (?1, ?2);",
                params![note, content],
            )?;
            let snippet = SnippetId(conn.last_insert_rowid());
            self.link_snippet(conn, snippet, extracted)?;
            self.link_note(conn, note, TokenKind::Url, &extracted.urls)?;
            Ok(snippet)
        })
    }

    fn replace_snippet(
        &self,
        snippet: SnippetId,
        content: &str,
        extracted: &Extracted,
    ) -> RepoResult<()> {
        unit_of_work(self.conn, |conn| {
            let note = snippet_owner(conn, snippet)?;
            for table in ["snippet_tags", "snippet_entities", "snippet_times"] {
                conn.execute(
                    &format!("DELETE FROM {table} WHERE snippet_id = ?1;"),
                    [snippet],
                )?;
            }
            conn.execute(
                "UPDATE snippets
                 SET content = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![snippet, content],
            )?;
            self.link_snippet(conn, snippet, extracted)?;
            self.relink_note_urls(conn, note)?;
            conn.execute(TOUCH_NOTE_SQL, [note])?;
            Ok(())
        })
    }

    fn delete_snippet(&self, snippet: SnippetId) -> RepoResult<()> {
        unit_of_work(self.conn, |conn| {
            let note = snippet_owner(conn, snippet)?;
            conn.execute("DELETE FROM snippets WHERE id = ?1;", [snippet])?;
            self.relink_note_urls(conn, note)?;
            conn.execute(TOUCH_NOTE_SQL, [note])?;
            Ok(())
        })
    }

    fn merge_note_tokens(
        &self,
        note: NoteId,
        kind: TokenKind,
        values: &BTreeSet<String>,
    ) -> RepoResult<usize> {
        unit_of_work(self.conn, |conn| {
            let changed = conn.execute(TOUCH_NOTE_SQL, [note])?;
            require_changed(changed, note)?;
            self.link_note(conn, note, kind, values)
        })
    }

    fn find_by_title(&self, pattern: &str) -> RepoResult<Vec<Note>> {
        let (predicate, bound) = if pattern.contains('*') {
            ("title LIKE ?1 ESCAPE '\\'", title_pattern_to_like(pattern))
        } else {
            ("title = ?1", pattern.to_string())
        };
        let sql = format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             WHERE {predicate}
             ORDER BY id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([bound])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn delete_notes(&self, ids: &[NoteId]) -> RepoResult<usize> {
        unit_of_work(self.conn, |conn| {
            let mut removed = 0;
            for id in ids {
                removed += conn.execute("DELETE FROM notes WHERE id = ?1;", [id])?;
            }
            Ok(removed)
        })
    }

    fn custom_fields(&self, id: NoteId) -> RepoResult<Option<String>> {
        note_text_column(self.conn, id, "custom_fields")
    }

    fn set_custom_fields(&self, id: NoteId, json: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET custom_fields = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, json],
        )?;
        require_changed(changed, id)
    }

    fn embedding(&self, id: NoteId) -> RepoResult<Option<String>> {
        note_text_column(self.conn, id, "embedding")
    }

    fn set_embedding(&self, id: NoteId, json: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notes SET embedding = ?2 WHERE id = ?1;",
            params![id, json],
        )?;
        require_changed(changed, id)
    }

    fn search(&self, filter: &SearchFilter) -> RepoResult<SearchOutcome> {
        search_notes(self.conn, filter)
    }
}

/// Converts a user title pattern with `*` wildcards into a `LIKE` pattern
/// escaped with `\`.
pub fn title_pattern_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '\\' | '%' | '_' => {
                like.push('\\');
                like.push(ch);
            }
            '*' => like.push('%'),
            other => like.push(other),
        }
    }
    like
}

/// Decodes a row selected with [`NOTE_COLUMNS`].
pub(crate) fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    Ok(Note {
        id: row.get("id")?,
        title: row.get("title")?,
        active: row.get("active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn require_changed(changed: usize, id: NoteId) -> RepoResult<()> {
    if changed == 0 {
        return Err(RepoError::NoteNotFound(id));
    }
    Ok(())
}

fn snippet_owner(conn: &Connection, snippet: SnippetId) -> RepoResult<NoteId> {
    conn.query_row(
        "SELECT note_id FROM snippets WHERE id = ?1;",
        [snippet],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(RepoError::SnippetNotFound(snippet))
}

fn note_text_column(conn: &Connection, id: NoteId, column: &'static str) -> RepoResult<Option<String>> {
    conn.query_row(
        &format!("SELECT {column} FROM notes WHERE id = ?1;"),
        [id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()?
    .ok_or(RepoError::NoteNotFound(id))
}

fn linked_values(
    conn: &Connection,
    table: &str,
    owner_column: &str,
    owner: i64,
) -> RepoResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT t.value
         FROM {table} l
         INNER JOIN tokens t ON t.id = l.token_id
         WHERE l.{owner_column} = ?1;"
    ))?;
    let mut rows = stmt.query([owner])?;
    let mut values = BTreeSet::new();
    while let Some(row) = rows.next()? {
        values.insert(row.get(0)?);
    }
    Ok(values)
}

fn linked_times(
    conn: &Connection,
    table: &str,
    owner_column: &str,
    owner: i64,
) -> RepoResult<BTreeSet<TimeEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT t.value, t.literal, t.scope
         FROM {table} l
         INNER JOIN times t ON t.id = l.time_id
         WHERE l.{owner_column} = ?1;"
    ))?;
    let mut rows = stmt.query([owner])?;
    let mut entries = BTreeSet::new();
    while let Some(row) = rows.next()? {
        entries.insert(parse_time_row(row)?);
    }
    Ok(entries)
}
