//! Location taxonomy use-case service.
//!
//! # Responsibility
//! - Resolve path notation against the stored tree, creating missing nodes.
//! - Bulk-load root specs and render the tree.
//! - Place notes at nodes.
//!
//! # Invariants
//! - `ensure_path` never creates a node when a same-named sibling already
//!   exists; two same-named siblings are a fatal `DuplicateSibling`.
//! - Missing segments of one path are created in a single unit of work.
//! - Structural problems in stored rows surface as `InvariantViolation`.

use crate::model::location::{
    expand_root_spec, format_path, parse_path, GraphError, LocationGraph, PathError,
    ROOT_NODE_NAME,
};
use crate::model::{NodeId, NoteId};
use crate::repo::location_repo::LocationRepository;
use crate::repo::RepoError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum LocationError {
    InvalidPath(PathError),
    /// Two children of one parent share the requested name.
    DuplicateSibling { parent: String, name: String },
    InvariantViolation(GraphError),
    NoteNotFound(NoteId),
    NodeNotFound(NodeId),
    Repo(RepoError),
}

impl Display for LocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(err) => write!(f, "{err}"),
            Self::DuplicateSibling { parent, name } => write!(
                f,
                "location `{parent}` has more than one child named `{name}`"
            ),
            Self::InvariantViolation(err) => write!(f, "location graph is corrupted: {err}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::NodeNotFound(id) => write!(f, "location node not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPath(err) => Some(err),
            Self::InvariantViolation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LocationError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NoteNotFound(id) => Self::NoteNotFound(id),
            RepoError::NodeNotFound(id) => Self::NodeNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<PathError> for LocationError {
    fn from(value: PathError) -> Self {
        Self::InvalidPath(value)
    }
}

impl From<GraphError> for LocationError {
    fn from(value: GraphError) -> Self {
        Self::InvariantViolation(value)
    }
}

/// Terminal node of a resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsuredPath {
    pub node: NodeId,
    /// Number of nodes created to reach it.
    pub created: usize,
}

/// Location taxonomy service facade.
pub struct LocationService<R: LocationRepository> {
    repo: R,
}

impl<R: LocationRepository> LocationService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Loads the stored tree into memory.
    pub fn load_graph(&self) -> Result<LocationGraph, LocationError> {
        let rows = self.repo.load_rows()?;
        let root = rows.root.ok_or(GraphError::MissingRoot)?;
        LocationGraph::from_rows(root, rows.nodes, &rows.edges).map_err(|err| {
            error!("event=graph_load module=location status=error error_code=invariant_violation");
            err.into()
        })
    }

    /// Walks `segments` from the root, creating whatever is missing.
    pub fn ensure_path(&self, segments: &[String]) -> Result<EnsuredPath, LocationError> {
        let mut graph = self.load_graph()?;
        self.ensure_in(&mut graph, segments)
    }

    /// Parses `"A > B > C"` and ensures it.
    pub fn add_path(&self, path: &str) -> Result<EnsuredPath, LocationError> {
        let segments = parse_path(path)?;
        self.ensure_path(&segments)
    }

    /// Bulk-loads root specs. A last segment with `|` alternatives expands
    /// into sibling paths. Returns one result per expanded path.
    pub fn init_roots<S: AsRef<str>>(&self, specs: &[S]) -> Result<Vec<EnsuredPath>, LocationError> {
        let mut expanded = Vec::new();
        for spec in specs {
            expanded.extend(expand_root_spec(spec.as_ref())?);
        }

        let mut graph = self.load_graph()?;
        let mut ensured = Vec::with_capacity(expanded.len());
        for segments in &expanded {
            ensured.push(self.ensure_in(&mut graph, segments)?);
        }
        info!(
            "event=graph_init module=location status=ok paths={} created={}",
            ensured.len(),
            ensured.iter().map(|path| path.created).sum::<usize>()
        );
        Ok(ensured)
    }

    /// Tree drawing of every category below the root.
    pub fn render(&self) -> Result<String, LocationError> {
        Ok(self.load_graph()?.render())
    }

    /// Top-level category names, sorted.
    pub fn root_names(&self) -> Result<Vec<String>, LocationError> {
        Ok(self.load_graph()?.root_names())
    }

    /// Places `note` at `node`. Returns false when it was already there.
    pub fn link_note(&self, note: NoteId, node: NodeId) -> Result<bool, LocationError> {
        self.repo.link_note(note, node).map_err(Into::into)
    }

    fn ensure_in(
        &self,
        graph: &mut LocationGraph,
        segments: &[String],
    ) -> Result<EnsuredPath, LocationError> {
        if segments.is_empty() {
            return Err(PathError::Empty.into());
        }
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(PathError::EmptySegment(format_path(segments)).into());
        }

        let mut current = graph.root();
        for (depth, name) in segments.iter().enumerate() {
            match graph.children_named(current, name).as_slice() {
                [] => {
                    let missing = &segments[depth..];
                    let created = self.repo.insert_path(current, missing)?;
                    let mut parent = current;
                    for (&node, name) in created.iter().zip(missing) {
                        graph.attach(parent, node, name)?;
                        parent = node;
                    }
                    return Ok(EnsuredPath {
                        node: parent,
                        created: created.len(),
                    });
                }
                [only] => current = *only,
                _ => {
                    let parent = graph
                        .path_of(current)
                        .filter(|path| !path.is_empty())
                        .map(|path| format_path(&path))
                        .unwrap_or_else(|| ROOT_NODE_NAME.to_string());
                    error!(
                        "event=ensure_path module=location status=error error_code=duplicate_sibling depth={depth}"
                    );
                    return Err(LocationError::DuplicateSibling {
                        parent,
                        name: name.clone(),
                    });
                }
            }
        }

        Ok(EnsuredPath {
            node: current,
            created: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LocationError, LocationService};
    use crate::db::open_db_in_memory;
    use crate::repo::location_repo::SqliteLocationRepository;

    #[test]
    fn reapplying_a_path_creates_nothing() {
        let conn = open_db_in_memory().unwrap();
        let service = LocationService::new(SqliteLocationRepository::try_new(&conn).unwrap());

        let first = service.add_path("Work > Projects > Alpha").unwrap();
        assert_eq!(first.created, 3);
        let again = service.add_path("Work>Projects>Alpha").unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.node, first.node);
    }

    #[test]
    fn blank_segment_is_invalid() {
        let conn = open_db_in_memory().unwrap();
        let service = LocationService::new(SqliteLocationRepository::try_new(&conn).unwrap());
        assert!(matches!(
            service.add_path("Work >  > Alpha"),
            Err(LocationError::InvalidPath(_))
        ));
        assert!(matches!(
            service.ensure_path(&[]),
            Err(LocationError::InvalidPath(_))
        ));
    }
}
