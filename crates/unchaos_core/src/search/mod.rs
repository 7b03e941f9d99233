//! Exact-match note filtering.
//!
//! # Responsibility
//! - Parse user filter terms (`#tag`, `@entity`, free text).
//! - Translate them into one SQL query over notes, snippets and links.
//!
//! # Invariants
//! - Only active notes are returned.
//! - No ranking: results are ordered by recency only.

pub mod filter;

pub use filter::{search_notes, SearchFilter, SearchOutcome};
