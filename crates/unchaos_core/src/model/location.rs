//! Location taxonomy as an index-based tree arena.
//!
//! # Responsibility
//! - Hold the category tree in memory as parent pointers + child lists.
//! - Parse `"A > B > C"` path notation and bulk-load root specs.
//! - Render the tree for display.
//!
//! # Invariants
//! - Exactly one synthetic root exists; it is never rendered.
//! - Every non-root node has exactly one parent. Loading rejects a second
//!   incoming edge instead of silently picking one.
//! - Traversals track visited nodes, so a corrupted store cannot loop them.

use crate::model::NodeId;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Name of the synthetic root node.
pub const ROOT_NODE_NAME: &str = "ROOT";
/// Separator between path segments.
pub const PATH_SEPARATOR: char = '>';
/// Separator between sibling alternatives in the last segment of a root spec.
pub const SIBLING_SEPARATOR: char = '|';

/// Structural problems found in stored nodes/edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// No root row exists.
    MissingRoot,
    /// An edge references a node id that is not loaded.
    UnknownNode(NodeId),
    /// A node has more than one incoming edge.
    MultipleParents(NodeId),
    /// An edge points into the root.
    EdgeIntoRoot(NodeId),
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRoot => write!(f, "location graph has no root node"),
            Self::UnknownNode(id) => write!(f, "edge references unknown node {id}"),
            Self::MultipleParents(id) => write!(f, "node {id} has more than one parent"),
            Self::EdgeIntoRoot(from) => write!(f, "node {from} has an edge into the root"),
        }
    }
}

impl Error for GraphError {}

/// Path notation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path has no segments at all.
    Empty,
    /// A segment is blank after trimming.
    EmptySegment(String),
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "location path is empty"),
            Self::EmptySegment(path) => write!(f, "location path `{path}` has an empty segment"),
        }
    }
}

impl Error for PathError {}

/// One category node inside the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNode {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// In-memory location tree.
#[derive(Debug, Clone)]
pub struct LocationGraph {
    nodes: Vec<LocationNode>,
    index: HashMap<NodeId, usize>,
    root: usize,
}

impl LocationGraph {
    /// Builds the arena from stored rows.
    ///
    /// `nodes` must contain the root. `edges` are `(from, to)` pairs.
    pub fn from_rows(
        root: NodeId,
        nodes: Vec<(NodeId, String)>,
        edges: &[(NodeId, NodeId)],
    ) -> Result<Self, GraphError> {
        let mut arena = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());
        for (id, name) in nodes {
            index.insert(id, arena.len());
            arena.push(LocationNode {
                id,
                name,
                parent: None,
                children: Vec::new(),
            });
        }

        let root = *index.get(&root).ok_or(GraphError::MissingRoot)?;
        let mut graph = Self {
            nodes: arena,
            index,
            root,
        };
        for &(from, to) in edges {
            graph.link(from, to)?;
        }
        Ok(graph)
    }

    /// Id of the synthetic root.
    pub fn root(&self) -> NodeId {
        self.nodes[self.root].id
    }

    /// Number of category nodes, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: NodeId) -> Option<&LocationNode> {
        self.index.get(&id).map(|&slot| &self.nodes[slot])
    }

    /// Children of `parent` whose name equals `name`.
    pub fn children_named(&self, parent: NodeId, name: &str) -> Vec<NodeId> {
        let Some(&slot) = self.index.get(&parent) else {
            return Vec::new();
        };
        self.nodes[slot]
            .children
            .iter()
            .map(|&child| &self.nodes[child])
            .filter(|child| child.name == name)
            .map(|child| child.id)
            .collect()
    }

    /// Adds a freshly stored node under `parent`.
    pub fn attach(&mut self, parent: NodeId, id: NodeId, name: &str) -> Result<(), GraphError> {
        if !self.index.contains_key(&parent) {
            return Err(GraphError::UnknownNode(parent));
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(LocationNode {
            id,
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
        });
        self.link(parent, id)
    }

    /// Names of the top-level categories, sorted.
    pub fn root_names(&self) -> Vec<String> {
        self.sorted_children(self.root)
            .into_iter()
            .map(|child| self.nodes[child].name.clone())
            .collect()
    }

    /// Segment names from the top-level category down to `id`.
    pub fn path_of(&self, id: NodeId) -> Option<Vec<String>> {
        let mut slot = *self.index.get(&id)?;
        let mut visited = HashSet::new();
        let mut names = Vec::new();
        while slot != self.root {
            if !visited.insert(slot) {
                return None;
            }
            let node = &self.nodes[slot];
            names.push(node.name.clone());
            slot = node.parent?;
        }
        names.reverse();
        Some(names)
    }

    /// Renders the tree depth-first, children in alphabetical order.
    ///
    /// Top-level categories start a line; descendants use `├── ` / `└── `
    /// connectors. The root itself is not shown.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut visited = HashSet::from([self.root]);
        for child in self.sorted_children(self.root) {
            if !visited.insert(child) {
                continue;
            }
            out.push_str(&self.nodes[child].name);
            out.push('\n');
            self.render_below(child, "", &mut visited, &mut out);
        }
        out
    }

    fn render_below(
        &self,
        slot: usize,
        prefix: &str,
        visited: &mut HashSet<usize>,
        out: &mut String,
    ) {
        let children: Vec<usize> = self
            .sorted_children(slot)
            .into_iter()
            .filter(|child| !visited.contains(child))
            .collect();
        let count = children.len();
        for (position, child) in children.into_iter().enumerate() {
            if !visited.insert(child) {
                continue;
            }
            let last = position + 1 == count;
            out.push_str(prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(&self.nodes[child].name);
            out.push('\n');
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            self.render_below(child, &nested, visited, out);
        }
    }

    fn sorted_children(&self, slot: usize) -> Vec<usize> {
        let mut children = self.nodes[slot].children.clone();
        children.sort_by(|&a, &b| {
            let left = &self.nodes[a];
            let right = &self.nodes[b];
            left.name
                .to_lowercase()
                .cmp(&right.name.to_lowercase())
                .then_with(|| left.name.cmp(&right.name))
                .then_with(|| left.id.cmp(&right.id))
        });
        children
    }

    fn link(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        let from_slot = *self.index.get(&from).ok_or(GraphError::UnknownNode(from))?;
        let to_slot = *self.index.get(&to).ok_or(GraphError::UnknownNode(to))?;
        if to_slot == self.root {
            return Err(GraphError::EdgeIntoRoot(from));
        }
        if self.nodes[to_slot].parent.is_some() {
            return Err(GraphError::MultipleParents(to));
        }
        self.nodes[to_slot].parent = Some(from_slot);
        self.nodes[from_slot].children.push(to_slot);
        Ok(())
    }
}

/// Splits `"A > B > C"` into trimmed segments.
pub fn parse_path(path: &str) -> Result<Vec<String>, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }
    path.split(PATH_SEPARATOR)
        .map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                Err(PathError::EmptySegment(path.to_string()))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

/// Expands a bulk-load root spec into independent paths.
///
/// A last segment containing `|` yields one path per alternative, all sharing
/// the same prefix: `"Work > Meetings|Reviews"` becomes `Work > Meetings` and
/// `Work > Reviews`.
pub fn expand_root_spec(spec: &str) -> Result<Vec<Vec<String>>, PathError> {
    let mut segments = parse_path(spec)?;
    let Some(last) = segments.pop() else {
        return Err(PathError::Empty);
    };
    if !last.contains(SIBLING_SEPARATOR) {
        segments.push(last);
        return Ok(vec![segments]);
    }

    last.split(SIBLING_SEPARATOR)
        .map(|alternative| {
            let alternative = alternative.trim();
            if alternative.is_empty() {
                return Err(PathError::EmptySegment(spec.to_string()));
            }
            let mut path = segments.clone();
            path.push(alternative.to_string());
            Ok(path)
        })
        .collect()
}

/// Joins segments back into display notation.
pub fn format_path(segments: &[String]) -> String {
    segments.join(" > ")
}
