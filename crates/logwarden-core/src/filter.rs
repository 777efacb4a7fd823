//! Query filters and histogram granularity.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::record::canonicalize_timestamp;

/// Filter over stored records; present fields must all match.
///
/// `level`, `log_name`, `provider`, and `event_id` match exactly, `message`
/// matches as a substring, and `start`/`end` bound the timestamp
/// inclusively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub level: Option<String>,
    pub log_name: Option<String>,
    pub provider: Option<String>,
    pub event_id: Option<i64>,
    pub message: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RecordFilter {
    /// Render as a SQL WHERE clause (leading space included) plus bound
    /// parameters. Record queries and aggregation share this, so every
    /// output of a stats request describes the same filtered view.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut conds: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if let Some(ref level) = self.level {
            conds.push("level = ?");
            params.push(Value::Text(level.clone()));
        }
        if let Some(ref log_name) = self.log_name {
            conds.push("log_name = ?");
            params.push(Value::Text(log_name.clone()));
        }
        if let Some(ref provider) = self.provider {
            conds.push("provider = ?");
            params.push(Value::Text(provider.clone()));
        }
        if let Some(event_id) = self.event_id {
            conds.push("event_id = ?");
            params.push(Value::Integer(event_id));
        }
        if let Some(ref needle) = self.message {
            conds.push("message LIKE ? ESCAPE '\\'");
            params.push(Value::Text(format!("%{}%", escape_like(needle))));
        }
        if let Some(ref start) = self.start {
            conds.push("timestamp >= ?");
            params.push(Value::Text(canonical_bound(start)));
        }
        if let Some(ref end) = self.end {
            conds.push("timestamp <= ?");
            params.push(Value::Text(canonical_bound(end)));
        }
        if conds.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", conds.join(" AND ")), params)
        }
    }
}

/// Range bounds are canonicalized like stored timestamps so the string
/// comparison stays chronological; an unparseable bound is used verbatim.
fn canonical_bound(raw: &str) -> String {
    canonicalize_timestamp(raw).unwrap_or_else(|| raw.to_string())
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Time-bucket unit for histograms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    #[default]
    Day,
    Month,
}

impl Granularity {
    /// Parse a user-supplied granularity; anything unrecognized falls back
    /// to day rather than failing the request.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "minute" => Self::Minute,
            "hour" => Self::Hour,
            "month" => Self::Month,
            _ => Self::Day,
        }
    }

    /// Truncate a timestamp to the start of its bucket.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let truncated = match self {
            Self::Minute => date.and_hms_opt(ts.hour(), ts.minute(), 0),
            Self::Hour => date.and_hms_opt(ts.hour(), 0, 0),
            Self::Day => date.and_hms_opt(0, 0, 0),
            Self::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        truncated
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_renders_no_where_clause() {
        let (clause, params) = RecordFilter::default().to_sql();
        assert_eq!(clause, "");
        assert!(params.is_empty());
    }

    #[test]
    fn conditions_join_with_and_in_field_order() {
        let filter = RecordFilter {
            level: Some("Error".to_string()),
            event_id: Some(7036),
            ..RecordFilter::default()
        };
        let (clause, params) = filter.to_sql();
        assert_eq!(clause, " WHERE level = ? AND event_id = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn message_substring_escapes_like_metacharacters() {
        let filter = RecordFilter {
            message: Some("100%_done".to_string()),
            ..RecordFilter::default()
        };
        let (_, params) = filter.to_sql();
        assert_eq!(
            params[0],
            Value::Text("%100\\%\\_done%".to_string())
        );
    }

    #[test]
    fn range_bounds_are_canonicalized() {
        let filter = RecordFilter {
            start: Some("2024-01-15T10:30:00+02:00".to_string()),
            end: Some("garbage".to_string()),
            ..RecordFilter::default()
        };
        let (_, params) = filter.to_sql();
        assert_eq!(
            params[0],
            Value::Text("2024-01-15T08:30:00.000000Z".to_string())
        );
        assert_eq!(params[1], Value::Text("garbage".to_string()));
    }

    #[test]
    fn granularity_parses_lossy_with_day_fallback() {
        assert_eq!(Granularity::parse_lossy("minute"), Granularity::Minute);
        assert_eq!(Granularity::parse_lossy("HOUR"), Granularity::Hour);
        assert_eq!(Granularity::parse_lossy("month"), Granularity::Month);
        assert_eq!(Granularity::parse_lossy("fortnight"), Granularity::Day);
        assert_eq!(Granularity::parse_lossy(""), Granularity::Day);
    }

    #[test]
    fn truncation_zeroes_the_sub_bucket_parts() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 17, 14, 35, 42).unwrap();
        assert_eq!(
            Granularity::Minute.truncate(ts),
            Utc.with_ymd_and_hms(2024, 3, 17, 14, 35, 0).unwrap()
        );
        assert_eq!(
            Granularity::Hour.truncate(ts),
            Utc.with_ymd_and_hms(2024, 3, 17, 14, 0, 0).unwrap()
        );
        assert_eq!(
            Granularity::Day.truncate(ts),
            Utc.with_ymd_and_hms(2024, 3, 17, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Granularity::Month.truncate(ts),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
