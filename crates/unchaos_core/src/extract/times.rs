//! Date/time literal recognition.
//!
//! Rules run from most to least specific. A rule match claims its span, and
//! later rules skip any match overlapping a claimed span, so `2025-03-09 14:05`
//! yields one minute-scoped entry instead of a date plus a clock time. A span
//! is claimed even when its calendar value is invalid, so `2025-02-30` yields
//! nothing rather than falling through to `2025-02`.

use crate::model::time::{TimeEntry, TimeScope};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::ops::Range;
use std::str::FromStr;

type Resolve = fn(&Captures<'_>, NaiveDateTime) -> Option<(NaiveDateTime, TimeScope)>;

struct Rule {
    pattern: Regex,
    resolve: Resolve,
}

impl Rule {
    fn new(pattern: &str, resolve: Resolve) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid time regex"),
            resolve,
        }
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(
            r"\b(\d{4})-(\d{2})-(\d{2})[T ](\d{1,2}):(\d{2})\b",
            iso_datetime,
        ),
        Rule::new(r"\b(\d{4})-(\d{2})-(\d{2})\b", iso_date),
        Rule::new(
            r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+(\d{4})\b",
            month_name_year,
        ),
        Rule::new(r"\b(\d{4})-(\d{2})\b", year_month),
        Rule::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s?(am|pm)\b", clock_12h),
        Rule::new(r"\b(\d{1,2}):(\d{2})\b", clock_24h),
        Rule::new(r"(?i)\b(today|tomorrow|yesterday)\b", relative_day),
    ]
});

/// Finds every date/time literal in `text`.
///
/// Clock times and relative words resolve against `reference`. Results keep
/// order of appearance with exact duplicates removed.
pub fn extract_times(text: &str, reference: NaiveDateTime) -> Vec<TimeEntry> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut found: Vec<(usize, TimeEntry)> = Vec::new();

    for rule in RULES.iter() {
        for captures in rule.pattern.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let span = whole.range();
            if claimed
                .iter()
                .any(|taken| taken.start < span.end && span.start < taken.end)
            {
                continue;
            }
            claimed.push(span.clone());
            if let Some((value, scope)) = (rule.resolve)(&captures, reference) {
                found.push((span.start, TimeEntry::new(value, whole.as_str(), scope)));
            }
        }
    }

    found.sort_by_key(|(start, _)| *start);
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, entry)| seen.insert(entry.clone()).then_some(entry))
        .collect()
}

fn number<T: FromStr>(captures: &Captures<'_>, group: usize) -> Option<T> {
    captures.get(group)?.as_str().parse().ok()
}

fn date(captures: &Captures<'_>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        number(captures, 1)?,
        number(captures, 2)?,
        number(captures, 3)?,
    )
}

fn iso_datetime(
    captures: &Captures<'_>,
    _reference: NaiveDateTime,
) -> Option<(NaiveDateTime, TimeScope)> {
    let value = date(captures)?.and_hms_opt(number(captures, 4)?, number(captures, 5)?, 0)?;
    Some((value, TimeScope::Minute))
}

fn iso_date(captures: &Captures<'_>, _reference: NaiveDateTime) -> Option<(NaiveDateTime, TimeScope)> {
    Some((date(captures)?.and_hms_opt(0, 0, 0)?, TimeScope::Day))
}

fn month_name_year(
    captures: &Captures<'_>,
    _reference: NaiveDateTime,
) -> Option<(NaiveDateTime, TimeScope)> {
    let name = captures.get(1)?.as_str().to_ascii_lowercase();
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    first_of_month(number(captures, 2)?, month)
}

fn year_month(captures: &Captures<'_>, _reference: NaiveDateTime) -> Option<(NaiveDateTime, TimeScope)> {
    first_of_month(number(captures, 1)?, number(captures, 2)?)
}

fn first_of_month(year: i32, month: u32) -> Option<(NaiveDateTime, TimeScope)> {
    let value = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    Some((value, TimeScope::Month))
}

fn clock_12h(captures: &Captures<'_>, reference: NaiveDateTime) -> Option<(NaiveDateTime, TimeScope)> {
    let hour: u32 = number(captures, 1)?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let minute: Option<u32> = match captures.get(2) {
        Some(_) => Some(number(captures, 2)?),
        None => None,
    };
    let afternoon = captures.get(3)?.as_str().eq_ignore_ascii_case("pm");
    let hour = hour % 12 + if afternoon { 12 } else { 0 };
    let value = reference.date().and_hms_opt(hour, minute.unwrap_or(0), 0)?;
    let scope = if minute.is_some() {
        TimeScope::Minute
    } else {
        TimeScope::Hour
    };
    Some((value, scope))
}

fn clock_24h(captures: &Captures<'_>, reference: NaiveDateTime) -> Option<(NaiveDateTime, TimeScope)> {
    let value = reference
        .date()
        .and_hms_opt(number(captures, 1)?, number(captures, 2)?, 0)?;
    Some((value, TimeScope::Minute))
}

fn relative_day(
    captures: &Captures<'_>,
    reference: NaiveDateTime,
) -> Option<(NaiveDateTime, TimeScope)> {
    let today = reference.date();
    let day = match captures.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "today" => today,
        "tomorrow" => today.succ_opt()?,
        "yesterday" => today.pred_opt()?,
        _ => return None,
    };
    Some((day.and_hms_opt(0, 0, 0)?, TimeScope::Day))
}

#[cfg(test)]
mod tests {
    use super::extract_times;
    use crate::model::time::TimeScope;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn reference() -> NaiveDateTime {
        at(2025, 3, 9, 8, 30)
    }

    #[test]
    fn iso_datetime_is_one_minute_entry() {
        let times = extract_times("deploy at 2025-04-01 14:05 sharp", reference());
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].value, at(2025, 4, 1, 14, 5));
        assert_eq!(times[0].scope, TimeScope::Minute);
        assert_eq!(times[0].literal, "2025-04-01 14:05");
    }

    #[test]
    fn iso_date_and_month_forms() {
        let times = extract_times("from 2025-04-01 until May 2025, review 2025-06", reference());
        let summary: Vec<(NaiveDateTime, TimeScope)> =
            times.iter().map(|entry| (entry.value, entry.scope)).collect();
        assert_eq!(
            summary,
            vec![
                (at(2025, 4, 1, 0, 0), TimeScope::Day),
                (at(2025, 5, 1, 0, 0), TimeScope::Month),
                (at(2025, 6, 1, 0, 0), TimeScope::Month),
            ]
        );
    }

    #[test]
    fn clock_times_use_reference_day() {
        let times = extract_times("standup 9:15am, lunch 1pm, call 17:45", reference());
        let summary: Vec<(NaiveDateTime, TimeScope)> =
            times.iter().map(|entry| (entry.value, entry.scope)).collect();
        assert_eq!(
            summary,
            vec![
                (at(2025, 3, 9, 9, 15), TimeScope::Minute),
                (at(2025, 3, 9, 13, 0), TimeScope::Hour),
                (at(2025, 3, 9, 17, 45), TimeScope::Minute),
            ]
        );
    }

    #[test]
    fn twelve_am_is_midnight() {
        let times = extract_times("12am", reference());
        assert_eq!(times[0].value, at(2025, 3, 9, 0, 0));
    }

    #[test]
    fn relative_words_resolve_to_days() {
        let times = extract_times("Yesterday, today and tomorrow", reference());
        let values: Vec<NaiveDateTime> = times.iter().map(|entry| entry.value).collect();
        assert_eq!(
            values,
            vec![at(2025, 3, 8, 0, 0), at(2025, 3, 9, 0, 0), at(2025, 3, 10, 0, 0)]
        );
        assert!(times.iter().all(|entry| entry.scope == TimeScope::Day));
    }

    #[test]
    fn invalid_calendar_values_are_skipped() {
        assert!(extract_times("2025-02-30", reference()).is_empty());
        assert!(extract_times("25:61 and 13pm", reference()).is_empty());
        assert!(extract_times("2025-13", reference()).is_empty());
    }

    #[test]
    fn repeated_literal_is_reported_once() {
        let times = extract_times("today or today", reference());
        assert_eq!(times.len(), 1);
    }
}
