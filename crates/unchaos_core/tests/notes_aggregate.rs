use rusqlite::Connection;
use std::collections::BTreeSet;
use unchaos_core::db::open_db_in_memory;
use unchaos_core::{
    AddSnippetOutcome, Confirmation, DeleteOutcome, NoteId, NoteSelector, NoteService,
    NoteServiceError, SearchFilter, SqliteNoteRepository, TokenKind, TokenStore,
};

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn snippet_text_links_tags_entities_and_urls() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("standup")).unwrap();

    let outcome = service
        .add_snippet(note.id, "Meet @Mike at 10am #todo, agenda on example.com/notes")
        .unwrap();
    assert!(matches!(outcome, AddSnippetOutcome::SnippetAdded { .. }));

    let detail = service.get_note(note.id).unwrap();
    assert_eq!(detail.snippets.len(), 1);
    assert_eq!(detail.snippets[0].tags, set(&["todo"]));
    assert_eq!(detail.snippets[0].entities, set(&["Mike"]));
    assert_eq!(detail.urls, set(&["example.com/notes"]));
    assert_eq!(detail.times_all().len(), 1);
    assert!(detail.tags.is_empty());
}

#[test]
fn tags_only_input_merges_into_note_without_snippet() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(None).unwrap();
    assert!(note.title.starts_with("untitled ("));

    let outcome = service.add_snippet(note.id, "#todo #urgent").unwrap();
    assert_eq!(
        outcome,
        AddSnippetOutcome::TagsMerged {
            tags: set(&["todo", "urgent"])
        }
    );

    let detail = service.get_note(note.id).unwrap();
    assert!(detail.snippets.is_empty());
    assert_eq!(detail.tags, set(&["todo", "urgent"]));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snippets;"), 0);
}

#[test]
fn tags_all_is_union_of_note_and_snippet_tags() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("groceries")).unwrap();

    service.add_snippet(note.id, "#shopping").unwrap();
    service.add_snippet(note.id, "buy milk #dairy").unwrap();
    service.add_snippet(note.id, "buy bread #bakery #shopping").unwrap();

    let detail = service.get_note(note.id).unwrap();
    assert_eq!(detail.tags, set(&["shopping"]));
    assert_eq!(detail.tags_all(), set(&["bakery", "dairy", "shopping"]));

    let tokens = TokenStore::try_new(&conn).unwrap();
    assert_eq!(
        tokens.list_in_use(TokenKind::Tag).unwrap(),
        vec!["bakery", "dairy", "shopping"]
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tokens WHERE value = 'shopping';"), 1);
}

#[test]
fn blank_snippet_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();

    assert!(matches!(
        service.add_snippet(note.id, "   "),
        Err(NoteServiceError::Validation(_))
    ));
}

#[test]
fn edit_snippet_replaces_links() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();
    service.add_snippet(note.id, "first #alpha").unwrap();
    service.add_snippet(note.id, "second #beta @Ann").unwrap();

    service
        .edit_snippet(note.id, 2, "second, revised #gamma")
        .unwrap();

    let detail = service.get_note(note.id).unwrap();
    assert_eq!(detail.snippets[1].content, "second, revised #gamma");
    assert_eq!(detail.snippets[1].tags, set(&["gamma"]));
    assert!(detail.snippets[1].entities.is_empty());
    assert_eq!(detail.snippets[0].tags, set(&["alpha"]));
}

#[test]
fn editing_or_deleting_a_snippet_drops_its_urls() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("links")).unwrap();
    service.add_snippet(note.id, "see example.com").unwrap();
    service.edit_snippet(note.id, 1, "nothing here").unwrap();
    assert!(service.get_note(note.id).unwrap().urls.is_empty());

    service.add_snippet(note.id, "other.org").unwrap();
    assert_eq!(service.get_note(note.id).unwrap().urls, set(&["other.org"]));
    service.delete_snippet(note.id, 2).unwrap();

    let detail = service.get_note(note.id).unwrap();
    assert!(detail.urls.is_empty());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM note_urls;"), 0);
    assert_eq!(
        TokenStore::try_new(&conn)
            .unwrap()
            .list_in_use(TokenKind::Url)
            .unwrap(),
        Vec::<String>::new()
    );
}

#[test]
fn url_shared_by_another_snippet_survives_delete() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("links")).unwrap();
    service.add_snippet(note.id, "docs at example.com").unwrap();
    service
        .add_snippet(note.id, "again example.com and rust-lang.org")
        .unwrap();

    service.delete_snippet(note.id, 2).unwrap();
    assert_eq!(service.get_note(note.id).unwrap().urls, set(&["example.com"]));
}

#[test]
fn archived_note_rejects_snippet_writes() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("old")).unwrap();
    service.add_snippet(note.id, "keep this").unwrap();
    service.archive(note.id).unwrap();

    assert!(matches!(
        service.add_snippet(note.id, "more text"),
        Err(NoteServiceError::NoteArchived(id)) if id == note.id
    ));
    assert!(matches!(
        service.add_snippet(note.id, "#late"),
        Err(NoteServiceError::NoteArchived(_))
    ));
    assert!(matches!(
        service.edit_snippet(note.id, 1, "changed"),
        Err(NoteServiceError::NoteArchived(_))
    ));
    assert!(matches!(
        service.delete_snippet(note.id, 1),
        Err(NoteServiceError::NoteArchived(_))
    ));

    let detail = service.get_note(note.id).unwrap();
    assert_eq!(detail.snippets.len(), 1);
    assert_eq!(detail.snippets[0].content, "keep this");
    assert!(detail.tags.is_empty());

    service.restore(note.id).unwrap();
    service.add_snippet(note.id, "back again").unwrap();
    assert_eq!(service.get_note(note.id).unwrap().snippets.len(), 2);
}

#[test]
fn bare_tag_marker_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();

    assert!(matches!(
        service.add_snippet(note.id, "#"),
        Err(NoteServiceError::Validation(_))
    ));
    assert!(matches!(
        service.add_snippet(note.id, "# #"),
        Err(NoteServiceError::Validation(_))
    ));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snippets;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM note_tags;"), 0);
}

#[test]
fn title_times_are_note_level_and_follow_renames() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("standup 2025-06-02")).unwrap();

    let detail = service.get_note(note.id).unwrap();
    let literals: Vec<&str> = detail.times.iter().map(|t| t.literal.as_str()).collect();
    assert_eq!(literals, vec!["2025-06-02"]);
    assert!(detail.snippets.is_empty());
    assert_eq!(detail.times_all(), detail.times);

    service.set_title(note.id, "retro").unwrap();
    assert!(service.get_note(note.id).unwrap().times.is_empty());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM note_times;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM times;"), 1);

    let untitled = service.create_note(None).unwrap();
    assert!(service.get_note(untitled.id).unwrap().times.is_empty());
}

#[test]
fn out_of_range_ordinal_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();
    service.add_snippet(note.id, "only line").unwrap();

    let err = service.delete_snippet(note.id, 2).unwrap_err();
    assert!(matches!(
        err,
        NoteServiceError::SnippetOrdinalOutOfRange {
            ordinal: 2,
            count: 1,
            ..
        }
    ));
    assert!(matches!(
        service.delete_snippet(note.id, 0),
        Err(NoteServiceError::SnippetOrdinalOutOfRange { .. })
    ));
    assert_eq!(service.get_note(note.id).unwrap().snippets.len(), 1);

    service.delete_snippet(note.id, 1).unwrap();
    assert!(service.get_note(note.id).unwrap().snippets.is_empty());
}

#[test]
fn unknown_note_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());

    assert!(matches!(
        service.get_note(NoteId(404)),
        Err(NoteServiceError::NoteNotFound(NoteId(404)))
    ));
    assert!(matches!(
        service.add_snippet(NoteId(404), "text"),
        Err(NoteServiceError::NoteNotFound(_))
    ));
}

#[test]
fn archive_hides_note_from_list_and_search_until_restored() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();
    service.add_snippet(note.id, "plan #trip").unwrap();

    service.archive(note.id).unwrap();
    assert!(service.list_notes(false).unwrap().is_empty());
    assert_eq!(service.list_notes(true).unwrap().len(), 1);
    let filter = SearchFilter::parse(["#trip"]);
    assert!(service.search(&filter).unwrap().notes.is_empty());

    service.restore(note.id).unwrap();
    assert_eq!(service.search(&filter).unwrap().notes.len(), 1);
}

#[test]
fn search_ands_tag_entity_and_text_filters() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let first = service.create_note(Some("one")).unwrap();
    service.add_snippet(first.id, "Budget review with @Mike #work").unwrap();
    let second = service.create_note(Some("two")).unwrap();
    service.add_snippet(second.id, "#work").unwrap();
    service.add_snippet(second.id, "lunch with @Ann").unwrap();

    let by_tag = service.search(&SearchFilter::parse(["#work"])).unwrap();
    assert_eq!(by_tag.notes.len(), 2);
    assert!(!by_tag.unscoped);

    let narrowed = service
        .search(&SearchFilter::parse(["#work", "@Mike", "budget"]))
        .unwrap();
    let ids: Vec<NoteId> = narrowed.notes.iter().map(|note| note.id).collect();
    assert_eq!(ids, vec![first.id]);

    let none = service
        .search(&SearchFilter::parse(["@Ann", "budget"]))
        .unwrap();
    assert!(none.notes.is_empty());

    let all = service.search(&SearchFilter::default()).unwrap();
    assert!(all.unscoped);
    assert_eq!(all.notes.len(), 2);
}

#[test]
fn declined_delete_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("keep me")).unwrap();

    let mut asked = 0;
    let mut decline = |targets: &[unchaos_core::Note]| {
        asked += targets.len();
        false
    };
    let outcome = service
        .delete_notes(&NoteSelector::Ids(vec![note.id]), Confirmation::Ask(&mut decline))
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Declined);
    assert_eq!(asked, 1);
    assert!(service.get_note(note.id).is_ok());
}

#[test]
fn delete_by_title_pattern_cascades_but_keeps_tokens() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let meeting = service.create_note(Some("meeting monday")).unwrap();
    service.add_snippet(meeting.id, "agenda #work @Mike").unwrap();
    let other = service.create_note(Some("meeting_notes")).unwrap();
    let kept = service.create_note(Some("shopping")).unwrap();

    let outcome = service
        .delete_notes(
            &NoteSelector::Title("meeting*".to_string()),
            Confirmation::Skip,
        )
        .unwrap();
    match outcome {
        DeleteOutcome::Deleted(ids) => {
            let ids: BTreeSet<NoteId> = ids.into_iter().collect();
            assert_eq!(ids, BTreeSet::from([meeting.id, other.id]));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert!(service.get_note(kept.id).is_ok());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snippets;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snippet_tags;"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tokens;"), 2);

    let nothing = service
        .delete_notes(&NoteSelector::Title("meeting*".to_string()), Confirmation::Skip)
        .unwrap();
    assert_eq!(nothing, DeleteOutcome::NothingMatched);
}

#[test]
fn custom_fields_are_parsed_as_json_data() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();

    service.set_custom_field(note.id, "priority", "3").unwrap();
    service
        .set_custom_field(note.id, "owner", "\"Ann\"")
        .unwrap();
    let fields = service.custom_fields(note.id).unwrap();
    assert_eq!(fields["priority"], serde_json::json!(3));
    assert_eq!(fields["owner"], serde_json::json!("Ann"));

    assert!(matches!(
        service.set_custom_field(note.id, "bad", "__import__('os')"),
        Err(NoteServiceError::InvalidCustomFields(_))
    ));

    conn.execute(
        "UPDATE notes SET custom_fields = '{broken' WHERE id = ?1;",
        [note.id],
    )
    .unwrap();
    assert!(matches!(
        service.custom_fields(note.id),
        Err(NoteServiceError::InvalidCustomFields(_))
    ));
}

#[test]
fn embedding_is_stored_as_json_vector() {
    let conn = open_db_in_memory().unwrap();
    let service = NoteService::new(SqliteNoteRepository::try_new(&conn).unwrap());
    let note = service.create_note(Some("n")).unwrap();

    assert_eq!(service.embedding(note.id).unwrap(), None);
    service.set_embedding(note.id, &[0.5, -1.0, 2.25]).unwrap();
    assert_eq!(
        service.embedding(note.id).unwrap(),
        Some(vec![0.5, -1.0, 2.25])
    );
}
