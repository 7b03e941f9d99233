//! Domain model for notes, tokens, locations and the enrichment queue.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Provide typed row identifiers so ids of different tables never mix.
//!
//! # Invariants
//! - Every persisted object is identified by its SQLite rowid.
//! - Soft deletion applies to notes only (`active=false`).

pub mod location;
pub mod note;
pub mod queue;
pub mod time;
pub mod token;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.0))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Identifier of one row in `notes`.
    NoteId
);
row_id!(
    /// Identifier of one row in `snippets`.
    SnippetId
);
row_id!(
    /// Identifier of one row in `tokens`.
    TokenId
);
row_id!(
    /// Identifier of one row in `nodes`.
    NodeId
);
row_id!(
    /// Identifier of one row in `queue`.
    QueueEntryId
);
row_id!(
    /// Identifier of one row in `times`.
    TimeEntryId
);
