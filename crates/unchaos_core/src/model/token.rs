//! Shared vocabulary tokens.

use crate::model::TokenId;
use serde::{Deserialize, Serialize};

/// One deduplicated string used as a tag, entity or URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub value: String,
}

/// Role a token plays for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// `#`-marked category word.
    Tag,
    /// `@`-marked named thing.
    Entity,
    /// Link-like word. Only tracked at note level.
    Url,
}

impl TokenKind {
    /// Note-level junction table for this kind.
    pub fn note_table(self) -> &'static str {
        match self {
            Self::Tag => "note_tags",
            Self::Entity => "note_entities",
            Self::Url => "note_urls",
        }
    }

    /// Snippet-level junction table, `None` for kinds only tracked on notes.
    pub fn snippet_table(self) -> Option<&'static str> {
        match self {
            Self::Tag => Some("snippet_tags"),
            Self::Entity => Some("snippet_entities"),
            Self::Url => None,
        }
    }
}
