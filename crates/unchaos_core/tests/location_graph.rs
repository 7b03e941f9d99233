use rusqlite::Connection;
use unchaos_core::db::open_db_in_memory;
use unchaos_core::model::location::GraphError;
use unchaos_core::{
    LocationError, LocationService, NodeId, NoteId, NoteService, SqliteLocationRepository,
    SqliteNoteRepository,
};

fn service(conn: &Connection) -> LocationService<SqliteLocationRepository<'_>> {
    LocationService::new(SqliteLocationRepository::try_new(conn).unwrap())
}

fn node_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM nodes WHERE is_root = 0;", [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn sibling_paths_share_their_prefix() {
    let conn = open_db_in_memory().unwrap();
    let locations = service(&conn);

    let alpha = locations.add_path("Work > Projects > Alpha").unwrap();
    let beta = locations.add_path("Work > Projects > Beta").unwrap();
    assert_eq!(alpha.created, 3);
    assert_eq!(beta.created, 1);
    assert_eq!(node_count(&conn), 4);

    let graph = locations.load_graph().unwrap();
    assert_eq!(
        graph.path_of(alpha.node).unwrap(),
        vec!["Work", "Projects", "Alpha"]
    );
    let alpha_parent = graph.node(alpha.node).unwrap().parent;
    let beta_parent = graph.node(beta.node).unwrap().parent;
    assert_eq!(alpha_parent, beta_parent);
}

#[test]
fn init_roots_expands_sibling_alternatives() {
    let conn = open_db_in_memory().unwrap();
    let locations = service(&conn);

    let ensured = locations
        .init_roots(&[
            "Work > Meetings|Reviews",
            "Household > Shopping",
            "Work > Meetings",
        ])
        .unwrap();
    assert_eq!(ensured.len(), 4);
    assert_eq!(ensured[3].created, 0);
    assert_eq!(ensured[3].node, ensured[0].node);

    let expected = "\
Household
└── Shopping
Work
├── Meetings
└── Reviews
";
    assert_eq!(locations.render().unwrap(), expected);
    assert_eq!(locations.root_names().unwrap(), vec!["Household", "Work"]);
}

#[test]
fn invalid_root_spec_creates_nothing() {
    let conn = open_db_in_memory().unwrap();
    let locations = service(&conn);

    let err = locations
        .init_roots(&["Work > Meetings", "Home >  > Garden"])
        .unwrap_err();
    assert!(matches!(err, LocationError::InvalidPath(_)));
    assert_eq!(node_count(&conn), 0);
}

#[test]
fn duplicate_siblings_are_fatal() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO nodes (id, name) VALUES (10, 'Work'), (11, 'Work');
         INSERT INTO edges (from_node, to_node) VALUES (1, 10), (1, 11);",
    )
    .unwrap();
    let locations = service(&conn);

    match locations.add_path("Work > Meetings").unwrap_err() {
        LocationError::DuplicateSibling { parent, name } => {
            assert_eq!(parent, "ROOT");
            assert_eq!(name, "Work");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(node_count(&conn), 2);
}

#[test]
fn missing_root_is_an_invariant_violation() {
    let conn = open_db_in_memory().unwrap();
    conn.execute("DELETE FROM nodes WHERE is_root = 1;", []).unwrap();
    let locations = service(&conn);

    assert!(matches!(
        locations.render(),
        Err(LocationError::InvariantViolation(GraphError::MissingRoot))
    ));
}

#[test]
fn linked_note_shows_location_paths() {
    let conn = open_db_in_memory().unwrap();
    let locations = service(&conn);
    let notes = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = notes.create_note(Some("sprint plan")).unwrap();

    let alpha = locations.add_path("Work > Projects > Alpha").unwrap();
    let meetings = locations.add_path("Work > Meetings").unwrap();
    assert!(locations.link_note(note.id, alpha.node).unwrap());
    assert!(!locations.link_note(note.id, alpha.node).unwrap());
    assert!(locations.link_note(note.id, meetings.node).unwrap());

    let detail = notes.get_note(note.id).unwrap();
    assert_eq!(
        detail.locations,
        vec!["Work > Meetings", "Work > Projects > Alpha"]
    );
}

#[test]
fn linking_unknown_ids_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let locations = service(&conn);
    let node = locations.add_path("Work").unwrap().node;

    assert!(matches!(
        locations.link_note(NoteId(99), node),
        Err(LocationError::NoteNotFound(NoteId(99)))
    ));

    let notes = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = notes.create_note(Some("n")).unwrap();
    assert!(matches!(
        locations.link_note(note.id, NodeId(999)),
        Err(LocationError::NodeNotFound(NodeId(999)))
    ));
}
