//! Recognized date/time literals.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Granularity of a recognized time literal.
///
/// Ordered from finest to coarsest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TimeScope {
    Minute,
    Hour,
    Day,
    Month,
}

impl TimeScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

/// A date/time literal found in text, resolved to a concrete value.
///
/// Identity is the full `(value, literal, scope)` triple: `10am` and `10:00`
/// on the same day are two entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeEntry {
    pub value: NaiveDateTime,
    pub literal: String,
    pub scope: TimeScope,
}

impl TimeEntry {
    pub fn new(value: NaiveDateTime, literal: impl Into<String>, scope: TimeScope) -> Self {
        Self {
            value,
            literal: literal.into(),
            scope,
        }
    }

    /// Text form persisted in `times.value`.
    pub fn storage_value(&self) -> String {
        self.value.format(STORAGE_FORMAT).to_string()
    }

    /// Parses a `times.value` column.
    pub fn parse_storage_value(value: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value, STORAGE_FORMAT).ok()
    }

    /// Human-readable rendering at the entry's own granularity.
    pub fn display_value(&self) -> String {
        let pattern = match self.scope {
            TimeScope::Minute => "%Y-%m-%d %H:%M",
            TimeScope::Hour => "%Y-%m-%d %H:00",
            TimeScope::Day => "%Y-%m-%d",
            TimeScope::Month => "%Y-%m",
        };
        self.value.format(pattern).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{TimeEntry, TimeScope};
    use chrono::NaiveDate;

    #[test]
    fn storage_value_round_trips_through_column_text() {
        let value = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        let entry = TimeEntry::new(value, "2025-03-09 14:05", TimeScope::Minute);
        assert_eq!(entry.storage_value(), "2025-03-09T14:05:00");
        assert_eq!(
            TimeEntry::parse_storage_value(&entry.storage_value()),
            Some(value)
        );
    }

    #[test]
    fn display_value_follows_scope() {
        let value = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let entry = TimeEntry::new(value, "March 2025", TimeScope::Month);
        assert_eq!(entry.display_value(), "2025-03");
    }
}
