use chrono::{NaiveDate, NaiveDateTime};
use unchaos_core::{extract_at, is_tags_only, strip_marker, TimeScope};

fn reference() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

#[test]
fn mixed_sentence_yields_every_token_kind() {
    let extracted = extract_at(
        "Ship #release-1 with @\"Data Team\" by 2025-06-13, notes at https://wiki.example.org/rel.",
        reference(),
    );

    assert!(extracted.tags.contains("release-1"));
    assert!(extracted.entities.contains("Data Team"));
    assert!(extracted.urls.contains("https://wiki.example.org/rel"));
    assert_eq!(extracted.times.len(), 1);
    assert_eq!(extracted.times[0].scope, TimeScope::Day);
    assert_eq!(extracted.times[0].literal, "2025-06-13");
}

#[test]
fn email_addresses_are_neither_entities_nor_urls() {
    let extracted = extract_at("mail ann@example.com about it", reference());
    assert!(extracted.entities.is_empty());
    assert!(extracted.urls.is_empty());
}

#[test]
fn stripping_is_idempotent_for_extracted_values() {
    let extracted = extract_at("#todo #\"two words\" @Mike @\"ACME Corp\"", reference());
    for value in extracted.tags.iter().chain(extracted.entities.iter()) {
        assert_eq!(strip_marker(value), *value);
        assert_eq!(strip_marker(&strip_marker(value)), strip_marker(value));
    }
    assert!(is_tags_only("#todo #urgent"));
    assert!(!is_tags_only("#todo buy milk"));
    assert!(!is_tags_only("   "));
}

#[test]
fn relative_words_resolve_against_reference() {
    let extracted = extract_at("dentist tomorrow", reference());
    assert_eq!(extracted.times.len(), 1);
    assert_eq!(
        extracted.times[0].value,
        NaiveDate::from_ymd_opt(2025, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    );
}
