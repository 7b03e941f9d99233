//! Filter parsing and SQL assembly for note search.

use crate::extract::strip_marker;
use crate::model::note::Note;
use crate::model::token::TokenKind;
use crate::repo::note_repo::{parse_note_row, NOTE_COLUMNS};
use crate::repo::RepoResult;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// Parsed search terms. All terms are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Exact tag values (note-level or any snippet).
    pub tags: Vec<String>,
    /// Exact entity values (note-level or any snippet).
    pub entities: Vec<String>,
    /// Case-insensitive substrings of any snippet content.
    pub text: Vec<String>,
}

impl SearchFilter {
    /// Classifies raw terms: `#x` is a tag, `@x` an entity, anything else
    /// free text. Blank terms are dropped.
    pub fn parse<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for term in terms {
            let term = term.as_ref().trim();
            let bucket = if term.starts_with('#') {
                &mut filter.tags
            } else if term.starts_with('@') {
                &mut filter.entities
            } else {
                if !term.is_empty() {
                    filter.text.push(term.to_string());
                }
                continue;
            };
            let value = strip_marker(term);
            if !value.is_empty() {
                bucket.push(value);
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.entities.is_empty() && self.text.is_empty()
    }
}

/// Search result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Matching active notes, newest first.
    pub notes: Vec<Note>,
    /// True when no filter was given and every active note was returned.
    pub unscoped: bool,
}

/// Runs `filter` against active notes.
pub fn search_notes(conn: &Connection, filter: &SearchFilter) -> RepoResult<SearchOutcome> {
    let mut sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE active = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    for tag in &filter.tags {
        push_token_clause(&mut sql, TokenKind::Tag);
        bind_values.push(Value::Text(tag.clone()));
        bind_values.push(Value::Text(tag.clone()));
    }
    for entity in &filter.entities {
        push_token_clause(&mut sql, TokenKind::Entity);
        bind_values.push(Value::Text(entity.clone()));
        bind_values.push(Value::Text(entity.clone()));
    }
    for text in &filter.text {
        sql.push_str(
            " AND EXISTS (
                SELECT 1
                FROM snippets s
                WHERE s.note_id = notes.id
                  AND s.content LIKE ? ESCAPE '\\'
            )",
        );
        bind_values.push(Value::Text(format!("%{}%", escape_like(text))));
    }
    sql.push_str(" ORDER BY updated_at DESC, id DESC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        notes.push(parse_note_row(row)?);
    }

    Ok(SearchOutcome {
        notes,
        unscoped: filter.is_empty(),
    })
}

fn push_token_clause(sql: &mut String, kind: TokenKind) {
    let note_table = kind.note_table();
    let Some(snippet_table) = kind.snippet_table() else {
        return;
    };
    sql.push_str(&format!(
        " AND (
            EXISTS (
                SELECT 1
                FROM {note_table} l
                INNER JOIN tokens t ON t.id = l.token_id
                WHERE l.note_id = notes.id AND t.value = ?
            )
            OR EXISTS (
                SELECT 1
                FROM {snippet_table} l
                INNER JOIN snippets s ON s.id = l.snippet_id
                INNER JOIN tokens t ON t.id = l.token_id
                WHERE s.note_id = notes.id AND t.value = ?
            )
        )"
    ));
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
