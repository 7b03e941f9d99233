//! Boundary to the external language-model collaborator.
//!
//! # Responsibility
//! - Define the blocking `EnrichmentProvider` contract used by the queue
//!   processor.
//! - Validate collaborator responses before anything is persisted.
//!
//! # Invariants
//! - A provider failure is either `Invalid` (the response cannot be used and
//!   retrying the same input will not help) or `Unavailable` (the
//!   collaborator could not be reached; retry later).

use crate::extract::strip_marker;
use crate::model::location::{parse_path, PATH_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod ollama;

pub use ollama::OllamaProvider;

/// Maximum number of suggested placements accepted per note.
pub const MAX_SUGGESTED_PATHS: usize = 3;
/// Maximum number of segments in one suggested path.
pub const MAX_SUGGESTED_DEPTH: usize = 6;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Malformed or unusable response.
    Invalid(String),
    /// Connectivity failure, timeout or server-side error.
    Unavailable(String),
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(reason) => write!(f, "invalid collaborator response: {reason}"),
            Self::Unavailable(cause) => write!(f, "collaborator unavailable: {cause}"),
        }
    }
}

impl Error for ProviderError {}

/// Tags and entities proposed for a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl NoteMetadata {
    /// Strips markers and drops blanks, yielding `(tags, entities)`.
    pub fn into_token_sets(self) -> (BTreeSet<String>, BTreeSet<String>) {
        (strip_all(self.tags), strip_all(self.entities))
    }
}

fn strip_all(values: Vec<String>) -> BTreeSet<String> {
    values
        .iter()
        .map(|value| strip_marker(value))
        .filter(|value| !value.is_empty())
        .collect()
}

/// Placement suggestions in path notation (`"Work > Meetings"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedNodes {
    #[serde(default, alias = "nestedPaths", alias = "nested_nodes")]
    pub nested_paths: Vec<String>,
}

impl SuggestedNodes {
    /// Checks the suggestion shape and splits each path into segments.
    ///
    /// Accepts 1 to [`MAX_SUGGESTED_PATHS`] paths, each containing a `>`
    /// separator and at most [`MAX_SUGGESTED_DEPTH`] non-empty segments.
    pub fn validate(&self) -> ProviderResult<Vec<Vec<String>>> {
        let count = self.nested_paths.len();
        if count == 0 {
            return Err(ProviderError::Invalid("no location suggested".to_string()));
        }
        if count > MAX_SUGGESTED_PATHS {
            return Err(ProviderError::Invalid(format!(
                "{count} locations suggested, at most {MAX_SUGGESTED_PATHS} allowed"
            )));
        }

        self.nested_paths
            .iter()
            .map(|path| {
                if !path.contains(PATH_SEPARATOR) {
                    return Err(ProviderError::Invalid(format!(
                        "suggested location `{path}` is not nested"
                    )));
                }
                let segments = parse_path(path)
                    .map_err(|err| ProviderError::Invalid(err.to_string()))?;
                if segments.len() > MAX_SUGGESTED_DEPTH {
                    return Err(ProviderError::Invalid(format!(
                        "suggested location `{path}` is deeper than {MAX_SUGGESTED_DEPTH} levels"
                    )));
                }
                Ok(segments)
            })
            .collect()
    }
}

/// Blocking enrichment collaborator.
pub trait EnrichmentProvider {
    /// Proposes tags and entities for the note text.
    fn assign_metadata(&self, text: &str) -> ProviderResult<NoteMetadata>;

    /// Proposes placements, given the existing top-level categories.
    fn suggest_nodes(&self, text: &str, existing_roots: &[String]) -> ProviderResult<SuggestedNodes>;

    /// Computes one embedding vector.
    fn embed(&self, text: &str) -> ProviderResult<Vec<f32>>;

    /// Computes embeddings for several texts, in input order.
    fn embed_many(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{NoteMetadata, ProviderError, SuggestedNodes, MAX_SUGGESTED_DEPTH};

    fn suggest(paths: &[&str]) -> SuggestedNodes {
        SuggestedNodes {
            nested_paths: paths.iter().map(|path| path.to_string()).collect(),
        }
    }

    #[test]
    fn empty_suggestion_is_rejected() {
        assert!(matches!(
            suggest(&[]).validate(),
            Err(ProviderError::Invalid(_))
        ));
    }

    #[test]
    fn more_than_three_suggestions_are_rejected() {
        let paths = suggest(&["A > B", "A > C", "A > D", "A > E"]);
        assert!(paths.validate().is_err());
    }

    #[test]
    fn flat_suggestion_is_rejected() {
        assert!(suggest(&["Work > Meetings", "Groceries"]).validate().is_err());
    }

    #[test]
    fn blank_segment_is_rejected() {
        assert!(suggest(&["Work > > Meetings"]).validate().is_err());
    }

    #[test]
    fn depth_limit_is_inclusive() {
        let deepest = (1..=MAX_SUGGESTED_DEPTH)
            .map(|level| format!("L{level}"))
            .collect::<Vec<_>>()
            .join(" > ");
        let segments = suggest(&[deepest.as_str()]).validate().unwrap();
        assert_eq!(segments[0].len(), MAX_SUGGESTED_DEPTH);

        let too_deep = format!("{deepest} > L{}", MAX_SUGGESTED_DEPTH + 1);
        assert!(suggest(&[too_deep.as_str()]).validate().is_err());
    }

    #[test]
    fn suggestion_field_aliases_are_accepted() {
        let parsed: SuggestedNodes =
            serde_json::from_str(r#"{"nested_nodes": ["Work > Meetings"]}"#).unwrap();
        assert_eq!(parsed.validate().unwrap(), vec![vec!["Work", "Meetings"]]);
    }

    #[test]
    fn metadata_markers_are_stripped() {
        let metadata = NoteMetadata {
            tags: vec!["#todo".to_string(), "work".to_string(), "#".to_string()],
            entities: vec!["@Mike".to_string()],
        };
        let (tags, entities) = metadata.into_token_sets();
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["todo", "work"]);
        assert_eq!(entities.into_iter().collect::<Vec<_>>(), vec!["Mike"]);
    }
}
