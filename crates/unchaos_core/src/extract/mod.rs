//! Token extraction from free text.
//!
//! # Responsibility
//! - Find `#tags`, `@entities`, link-like words and date/time literals.
//! - Normalize extracted values so they carry no marker.
//!
//! # Invariants
//! - Extraction is pure and total: any input yields a (possibly empty) result.
//! - `strip_marker(strip_marker(x)) == strip_marker(x)`.
//! - A marker only counts at the start of text or after a non-word
//!   character, so `mike@example.com` contains no entity.

mod times;

pub use times::extract_times;

use crate::model::time::TimeEntry;
use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w])#(?:"([^"]+)"|(\w[\w-]*))"#).expect("valid tag regex")
});
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w])@(?:"([^"]+)"|(\w[\w-]*))"#).expect("valid entity regex")
});
static SCHEME_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://\S+$").expect("valid scheme url regex")
});
static HOST_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}(?::\d+)?(?:[/?#]\S*)?$")
        .expect("valid host url regex")
});

const LEADING_WRAPPERS: &[char] = &['(', '<', '[', '"', '\''];
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '>', ']', '"', '\''];

/// Everything recognized in one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub tags: BTreeSet<String>,
    pub entities: BTreeSet<String>,
    pub urls: BTreeSet<String>,
    /// De-duplicated, in order of appearance.
    pub times: Vec<TimeEntry>,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.entities.is_empty()
            && self.urls.is_empty()
            && self.times.is_empty()
    }
}

/// Extracts tokens, resolving relative time literals against local now.
pub fn extract(text: &str) -> Extracted {
    extract_at(text, Local::now().naive_local())
}

/// Extracts tokens, resolving relative time literals against `reference`.
pub fn extract_at(text: &str, reference: NaiveDateTime) -> Extracted {
    Extracted {
        tags: marked_values(&TAG_RE, text),
        entities: marked_values(&ENTITY_RE, text),
        urls: extract_urls(text),
        times: extract_times(text, reference),
    }
}

/// Returns true when the text has at least one word and every
/// whitespace-delimited word starts with `#`.
pub fn is_tags_only(text: &str) -> bool {
    let mut words = text.split_whitespace().peekable();
    words.peek().is_some() && words.all(|word| word.starts_with('#'))
}

/// Returns true when the text would produce a snippet or at least one tag.
/// Blank text and bare markers such as `#` carry nothing.
pub fn has_content(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    !is_tags_only(text) || !marked_values(&TAG_RE, text).is_empty()
}

/// Removes leading markers, quotes and whitespace plus trailing quotes and
/// whitespace.
pub fn strip_marker(value: &str) -> String {
    value
        .trim_start_matches(|c: char| c == '#' || c == '@' || c == '"' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '"' || c.is_whitespace())
        .to_string()
}

fn marked_values(pattern: &Regex, text: &str) -> BTreeSet<String> {
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|value| strip_marker(value.as_str()))
        .filter(|value| !value.is_empty())
        .collect()
}

/// Link-like words of `text`, with wrapping punctuation removed.
pub fn extract_urls(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .filter(|word| !word.starts_with('#') && !word.starts_with('@'))
        .map(|word| {
            word.trim_start_matches(LEADING_WRAPPERS)
                .trim_end_matches(TRAILING_PUNCTUATION)
        })
        .filter(|word| !word.contains('@') && is_url_like(word))
        .map(str::to_string)
        .collect()
}

fn is_url_like(word: &str) -> bool {
    if SCHEME_URL_RE.is_match(word) {
        return true;
    }
    if let Some(rest) = word.strip_prefix("www.") {
        return !rest.is_empty();
    }
    HOST_URL_RE.is_match(word)
}

#[cfg(test)]
mod tests {
    use super::{extract_at, has_content, is_tags_only, strip_marker};
    use crate::model::time::TimeScope;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn reference() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn extracts_tags_entities_and_clock_time() {
        let extracted = extract_at("Meet @Mike at 10am #todo", reference());
        assert_eq!(extracted.tags, set(&["todo"]));
        assert_eq!(extracted.entities, set(&["Mike"]));
        assert!(extracted.urls.is_empty());
        assert_eq!(extracted.times.len(), 1);
        assert_eq!(extracted.times[0].literal, "10am");
        assert_eq!(extracted.times[0].scope, TimeScope::Hour);
    }

    #[test]
    fn quoted_markers_capture_multiple_words() {
        let extracted = extract_at(r#"call @"Anna Smith" about #"q3 budget""#, reference());
        assert_eq!(extracted.entities, set(&["Anna Smith"]));
        assert_eq!(extracted.tags, set(&["q3 budget"]));
    }

    #[test]
    fn email_address_is_neither_entity_nor_url() {
        let extracted = extract_at("write to mike@example.com today", reference());
        assert!(extracted.entities.is_empty());
        assert!(extracted.urls.is_empty());
    }

    #[test]
    fn recognizes_url_shapes_and_trims_punctuation() {
        let extracted = extract_at(
            "see https://docs.rs/regex, www.rust-lang.org and (example.com/path). e.g. 10.5",
            reference(),
        );
        assert_eq!(
            extracted.urls,
            set(&["example.com/path", "https://docs.rs/regex", "www.rust-lang.org"])
        );
    }

    #[test]
    fn hashtag_word_is_not_a_url() {
        let extracted = extract_at("#example.com", reference());
        assert!(extracted.urls.is_empty());
        assert_eq!(extracted.tags, set(&["example"]));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract_at("", reference()).is_empty());
        assert!(extract_at("   \n", reference()).is_empty());
    }

    #[test]
    fn tags_only_requires_at_least_one_word() {
        assert!(is_tags_only("#todo #urgent"));
        assert!(is_tags_only("  #todo  "));
        assert!(!is_tags_only("#todo later"));
        assert!(!is_tags_only(""));
        assert!(!is_tags_only("   "));
    }

    #[test]
    fn strip_marker_is_idempotent() {
        for raw in ["#todo", "@Mike", "\"#quoted\" ", "  @\"Anna Smith\"", "plain", "#\"", ""] {
            let once = strip_marker(raw);
            assert_eq!(strip_marker(&once), once, "raw={raw:?}");
        }
        assert_eq!(strip_marker("#todo"), "todo");
        assert_eq!(strip_marker("@\"Anna Smith\""), "Anna Smith");
    }

    #[test]
    fn extracted_values_are_already_stripped() {
        let extracted = extract_at("#a-b @c #\" spaced \" @\"x\"", reference());
        for value in extracted.tags.iter().chain(extracted.entities.iter()) {
            assert_eq!(&strip_marker(value), value);
        }
        assert_eq!(extracted.tags, set(&["a-b", "spaced"]));
    }

    #[test]
    fn bare_markers_have_no_content() {
        assert!(!has_content(""));
        assert!(!has_content("#"));
        assert!(!has_content(" # # "));
        assert!(has_content("#todo"));
        assert!(has_content("# heading text"));
    }
}
