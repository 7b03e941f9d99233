//! Core domain logic for unchaos: note capture, token extraction, the
//! location taxonomy and the enrichment queue.
//! This crate is the single source of truth for business invariants.

pub mod config;
pub mod db;
pub mod extract;
pub mod logging;
pub mod model;
pub mod provider;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{default_config_path, AppConfig, ConfigError, LlmConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, unit_of_work, DbError};
pub use extract::{extract, extract_at, has_content, is_tags_only, strip_marker, Extracted};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::location::{LocationGraph, ROOT_NODE_NAME};
pub use model::note::{Note, NoteDetail, Snippet};
pub use model::queue::{QueueEntry, QueueStatus, QueueTask};
pub use model::time::{TimeEntry, TimeScope};
pub use model::token::{Token, TokenKind};
pub use model::{NodeId, NoteId, QueueEntryId, SnippetId, TokenId};
pub use provider::{
    EnrichmentProvider, NoteMetadata, OllamaProvider, ProviderError, SuggestedNodes,
};
pub use repo::location_repo::SqliteLocationRepository;
pub use repo::note_repo::SqliteNoteRepository;
pub use repo::queue_repo::SqliteQueueRepository;
pub use repo::token_repo::TokenStore;
pub use repo::{RepoError, RepoResult};
pub use search::{SearchFilter, SearchOutcome};
pub use service::capture::{
    read_capture_input, CaptureError, CaptureOutcome, CaptureResult, CaptureSession,
};
pub use service::location_service::{EnsuredPath, LocationError, LocationService};
pub use service::note_service::{
    AddSnippetOutcome, Confirmation, DeleteOutcome, NoteSelector, NoteService, NoteServiceError,
};
pub use service::queue_service::{DrainReport, QueueError, QueueService, TaskProcessor};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
