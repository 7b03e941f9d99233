//! Shared vocabulary storage: tokens and time entries.
//!
//! # Responsibility
//! - Deduplicate strings used as tags, entities and URLs into `tokens`.
//! - Deduplicate recognized time literals into `times`.
//! - List the vocabulary currently in use.
//!
//! # Invariants
//! - One `tokens` row per distinct value, compared by exact equality.
//! - One `times` row per `(value, literal, scope)` triple.
//! - Rows are never deleted through this store; link tables reference them
//!   with `ON DELETE RESTRICT`.

use crate::model::time::{TimeEntry, TimeScope};
use crate::model::token::{Token, TokenKind};
use crate::model::{TimeEntryId, TokenId};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

/// SQLite-backed token/time vocabulary.
pub struct TokenStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TokenStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                ("tokens", &["id", "value"]),
                ("times", &["id", "value", "literal", "scope"]),
            ],
        )?;
        Ok(Self { conn })
    }

    /// Returns the token for `value`, inserting it on first use.
    ///
    /// Safe to call repeatedly inside one unit of work.
    pub fn get_or_create(&self, value: &str) -> RepoResult<Token> {
        self.conn
            .execute("INSERT OR IGNORE INTO tokens (value) VALUES (?1);", [value])?;
        let token = self.conn.query_row(
            "SELECT id, value FROM tokens WHERE value = ?1;",
            [value],
            |row| {
                Ok(Token {
                    id: row.get("id")?,
                    value: row.get("value")?,
                })
            },
        )?;
        Ok(token)
    }

    /// Returns the id of the stored time entry, inserting it on first use.
    pub fn get_or_create_time(&self, entry: &TimeEntry) -> RepoResult<TimeEntryId> {
        let value = entry.storage_value();
        let scope = entry.scope.as_str();
        self.conn.execute(
            "INSERT OR IGNORE INTO times (value, literal, scope) VALUES (?1, ?2, ?3);",
            params![value, entry.literal, scope],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM times WHERE value = ?1 AND literal = ?2 AND scope = ?3;",
            params![value, entry.literal, scope],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Lists every stored token sorted by value.
    pub fn list_tokens(&self) -> RepoResult<Vec<Token>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, value FROM tokens ORDER BY value ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tokens = Vec::new();
        while let Some(row) = rows.next()? {
            tokens.push(Token {
                id: row.get::<_, TokenId>("id")?,
                value: row.get("value")?,
            });
        }
        Ok(tokens)
    }

    /// Lists token values referenced by at least one link of `kind`.
    pub fn list_in_use(&self, kind: TokenKind) -> RepoResult<Vec<String>> {
        let mut sources = vec![format!("SELECT token_id FROM {}", kind.note_table())];
        if let Some(table) = kind.snippet_table() {
            sources.push(format!("SELECT token_id FROM {table}"));
        }
        let sql = format!(
            "SELECT value
             FROM tokens
             WHERE id IN ({})
             ORDER BY value ASC;",
            sources.join(" UNION ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(row.get(0)?);
        }
        Ok(values)
    }

    /// Lists time entries linked to at least one note or snippet, in
    /// chronological order.
    pub fn list_times_in_use(&self) -> RepoResult<Vec<TimeEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT value, literal, scope
             FROM times
             WHERE id IN (
                SELECT time_id FROM note_times
                UNION
                SELECT time_id FROM snippet_times
             )
             ORDER BY value ASC, literal ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_time_row(row)?);
        }
        Ok(entries)
    }
}

/// Decodes a `(value, literal, scope)` row from `times`.
pub(crate) fn parse_time_row(row: &Row<'_>) -> RepoResult<TimeEntry> {
    let value: String = row.get("value")?;
    let scope: String = row.get("scope")?;
    let parsed = TimeEntry::parse_storage_value(&value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid times.value `{value}`")))?;
    let scope = TimeScope::parse(&scope)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid times.scope `{scope}`")))?;
    Ok(TimeEntry::new(parsed, row.get::<_, String>("literal")?, scope))
}

#[cfg(test)]
mod tests {
    use super::TokenStore;
    use crate::db::open_db_in_memory;
    use crate::model::time::{TimeEntry, TimeScope};
    use chrono::NaiveDate;

    #[test]
    fn get_or_create_deduplicates_by_exact_value() {
        let conn = open_db_in_memory().unwrap();
        let store = TokenStore::try_new(&conn).unwrap();

        let first = store.get_or_create("todo").unwrap();
        let again = store.get_or_create("todo").unwrap();
        let other_case = store.get_or_create("Todo").unwrap();

        assert_eq!(first, again);
        assert_ne!(first.id, other_case.id);
        assert_eq!(store.list_tokens().unwrap().len(), 2);
    }

    #[test]
    fn time_identity_is_the_full_triple() {
        let conn = open_db_in_memory().unwrap();
        let store = TokenStore::try_new(&conn).unwrap();
        let ten = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        let hour = store
            .get_or_create_time(&TimeEntry::new(ten, "10am", TimeScope::Hour))
            .unwrap();
        let same = store
            .get_or_create_time(&TimeEntry::new(ten, "10am", TimeScope::Hour))
            .unwrap();
        let minute = store
            .get_or_create_time(&TimeEntry::new(ten, "10:00", TimeScope::Minute))
            .unwrap();

        assert_eq!(hour, same);
        assert_ne!(hour, minute);
    }
}
