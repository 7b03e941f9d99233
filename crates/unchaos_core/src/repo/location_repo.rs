//! Location taxonomy persistence.
//!
//! # Responsibility
//! - Load raw `nodes`/`edges` rows for the in-memory graph.
//! - Insert child nodes together with their single incoming edge.
//! - Maintain note placement links (`note_nodes`).
//!
//! # Invariants
//! - The root row is created by migration and never written here.
//! - A node and its edge are inserted in one unit of work; `edges.to_node`
//!   is unique, so a second parent is rejected by the schema.

use crate::db::unit_of_work;
use crate::model::location::format_path;
use crate::model::{NodeId, NoteId};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Upper bound on ancestor walks in SQL, guarding against corrupted edges.
const MAX_ANCESTOR_DEPTH: i64 = 64;

/// Raw graph rows as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphRows {
    pub root: Option<NodeId>,
    pub nodes: Vec<(NodeId, String)>,
    /// `(from, to)` pairs.
    pub edges: Vec<(NodeId, NodeId)>,
}

/// Repository interface for the location taxonomy.
pub trait LocationRepository {
    fn load_rows(&self) -> RepoResult<GraphRows>;
    /// Creates the chain `names[0] > names[1] > ...` below `parent` and
    /// returns the new node ids in order.
    fn insert_path(&self, parent: NodeId, names: &[String]) -> RepoResult<Vec<NodeId>>;
    /// Places a note at a node. Returns false when already linked.
    fn link_note(&self, note: NoteId, node: NodeId) -> RepoResult<bool>;
}

/// SQLite-backed location repository.
pub struct SqliteLocationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLocationRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                ("nodes", &["id", "name", "is_root"]),
                ("edges", &["from_node", "to_node"]),
                ("note_nodes", &["note_id", "node_id"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl LocationRepository for SqliteLocationRepository<'_> {
    fn load_rows(&self) -> RepoResult<GraphRows> {
        let root = self
            .conn
            .query_row("SELECT id FROM nodes WHERE is_root = 1;", [], |row| {
                row.get(0)
            })
            .optional()?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM nodes ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push((row.get(0)?, row.get(1)?));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT from_node, to_node FROM edges ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push((row.get(0)?, row.get(1)?));
        }

        Ok(GraphRows { root, nodes, edges })
    }

    fn insert_path(&self, parent: NodeId, names: &[String]) -> RepoResult<Vec<NodeId>> {
        unit_of_work(self.conn, |conn| {
            if !node_exists(conn, parent)? {
                return Err(RepoError::NodeNotFound(parent));
            }
            let mut created = Vec::with_capacity(names.len());
            let mut current = parent;
            for name in names {
                conn.execute("INSERT INTO nodes (name) VALUES (?1);", [name])?;
                let node = NodeId(conn.last_insert_rowid());
                conn.execute(
                    "INSERT INTO edges (from_node, to_node) VALUES (?1, ?2);",
                    params![current, node],
                )?;
                created.push(node);
                current = node;
            }
            Ok(created)
        })
    }

    fn link_note(&self, note: NoteId, node: NodeId) -> RepoResult<bool> {
        unit_of_work(self.conn, |conn| {
            let note_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1);",
                [note],
                |row| row.get(0),
            )?;
            if !note_exists {
                return Err(RepoError::NoteNotFound(note));
            }
            if !node_exists(conn, node)? {
                return Err(RepoError::NodeNotFound(node));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO note_nodes (note_id, node_id) VALUES (?1, ?2);",
                params![note, node],
            )?;
            Ok(inserted == 1)
        })
    }
}

/// Path notation of every location a note is placed at, sorted.
pub(crate) fn note_location_paths(conn: &Connection, note: NoteId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE chain (leaf, node_id, depth) AS (
            SELECT node_id, node_id, 0
            FROM note_nodes
            WHERE note_id = ?1
            UNION ALL
            SELECT chain.leaf, edges.from_node, chain.depth + 1
            FROM chain
            INNER JOIN edges ON edges.to_node = chain.node_id
            WHERE chain.depth < ?2
         )
         SELECT chain.leaf, nodes.name
         FROM chain
         INNER JOIN nodes ON nodes.id = chain.node_id
         WHERE nodes.is_root = 0
         ORDER BY chain.leaf ASC, chain.depth DESC;",
    )?;
    let mut rows = stmt.query(params![note, MAX_ANCESTOR_DEPTH])?;
    let mut segments: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        segments
            .entry(row.get(0)?)
            .or_default()
            .push(row.get(1)?);
    }

    let mut paths: Vec<String> = segments.values().map(|path| format_path(path)).collect();
    paths.sort();
    Ok(paths)
}

fn node_exists(conn: &Connection, node: NodeId) -> RepoResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1);",
        [node],
        |row| row.get(0),
    )?;
    Ok(exists)
}
