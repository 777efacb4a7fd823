//! Log record model and ingest-side normalization.
//!
//! Collector agents ship semi-structured records whose field names vary by
//! source (`TimeCreated` vs `timestamp`, `LogName` vs `source`, ...).
//! [`RawRecord`] absorbs the known spellings through serde aliases and
//! [`RawRecord::normalize`] applies the collector defaults to produce the
//! canonical [`LogRecord`] that the store persists.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

/// Longest message text retained on a stored record.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// A normalized, persisted log record.
///
/// The (`timestamp`, `event_id`, `provider`) triple is the dedup key: at
/// most one stored record exists per distinct triple, and the store ignores
/// re-inserts of a triple it has already seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Canonical RFC 3339 UTC when the input parsed; the raw input string
    /// otherwise (fail-soft).
    pub timestamp: String,
    pub event_id: i64,
    pub level: String,
    pub log_name: String,
    pub provider: String,
    pub message: String,
    pub machine_name: String,
    /// When the ingestion layer first saw this record.
    pub collected_at: String,
}

/// Key identifying a logically unique log occurrence.
pub type DedupKey = (String, i64, String);

impl LogRecord {
    pub fn dedup_key(&self) -> DedupKey {
        (self.timestamp.clone(), self.event_id, self.provider.clone())
    }

    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("error") || self.level.eq_ignore_ascii_case("critical")
    }

    pub fn is_warning(&self) -> bool {
        self.level.eq_ignore_ascii_case("warning")
    }

    pub fn is_info(&self) -> bool {
        self.level.eq_ignore_ascii_case("information") || self.level.eq_ignore_ascii_case("info")
    }
}

/// A raw ingest candidate before normalization.
///
/// Every field is optional; unknown fields are ignored. The aliases cover
/// both the agent's native event-log spellings and the normalized wire
/// names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default, alias = "TimeCreated")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "Id")]
    pub event_id: Option<i64>,
    #[serde(default, alias = "LevelDisplayName")]
    pub level: Option<String>,
    #[serde(default, alias = "LogName", alias = "source")]
    pub log_name: Option<String>,
    #[serde(default, alias = "ProviderName")]
    pub provider: Option<String>,
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(default, alias = "MachineName")]
    pub machine_name: Option<String>,
}

impl RawRecord {
    /// Decode one batch entry. A non-object or wrong-typed entry is
    /// malformed input: the caller skips it and continues with the batch.
    pub fn from_value(value: serde_json::Value) -> Result<Self, NormalizeError> {
        if !value.is_object() {
            return Err(NormalizeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Normalize into a stored record, applying the collector defaults:
    /// absent event_id becomes 0, absent level "Information", absent
    /// category/provider/host "Unknown", absent message empty, absent
    /// timestamp the current time. A timestamp that matches no known format
    /// is retained verbatim.
    pub fn normalize(self, now: DateTime<Utc>) -> LogRecord {
        let timestamp = match self.timestamp {
            Some(raw) => canonicalize_timestamp(&raw).unwrap_or(raw),
            None => format_timestamp(now),
        };
        LogRecord {
            timestamp,
            event_id: self.event_id.unwrap_or(0),
            level: self.level.unwrap_or_else(|| "Information".to_string()),
            log_name: self.log_name.unwrap_or_else(|| "Unknown".to_string()),
            provider: self.provider.unwrap_or_else(|| "Unknown".to_string()),
            message: truncate_chars(&self.message.unwrap_or_default(), MAX_MESSAGE_LEN),
            machine_name: self.machine_name.unwrap_or_else(|| "Unknown".to_string()),
            collected_at: format_timestamp(now),
        }
    }
}

/// Render a timestamp in the canonical stored form: RFC 3339 UTC with
/// microseconds. Fixed width, so lexicographic order is chronological.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into a point in time. `None` for records
/// whose raw timestamp was retained verbatim.
pub fn parse_timestamp(stored: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(stored)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a timestamp in any accepted input form into the canonical stored
/// form. Accepts RFC 3339 (any offset), naive ISO-8601 (assumed UTC), and
/// the legacy `/Date(millis)/` form. Returns `None` when nothing matches.
pub fn canonicalize_timestamp(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(format_timestamp(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(format_timestamp(Utc.from_utc_datetime(&naive)));
    }
    if let Some(millis) = parse_legacy_millis(raw) {
        return DateTime::<Utc>::from_timestamp_millis(millis).map(format_timestamp);
    }
    None
}

/// Extract the millisecond count from the legacy `/Date(1700000000000)/`
/// serialization some collectors emit.
fn parse_legacy_millis(raw: &str) -> Option<i64> {
    let rest = raw.strip_prefix("/Date(")?;
    let end = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if end == 0 || !rest[end..].starts_with(')') {
        return None;
    }
    rest[..end].parse().ok()
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn canonicalizes_rfc3339_with_offset_to_utc() {
        let got = canonicalize_timestamp("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(got, "2024-01-15T08:30:00.000000Z");
    }

    #[test]
    fn canonicalizes_naive_isoformat_as_utc() {
        let got = canonicalize_timestamp("2024-01-15T10:30:00.5").unwrap();
        assert_eq!(got, "2024-01-15T10:30:00.500000Z");
    }

    #[test]
    fn canonicalizes_legacy_date_millis() {
        let got = canonicalize_timestamp("/Date(1705314600000)/").unwrap();
        assert_eq!(got, "2024-01-15T10:30:00.000000Z");
    }

    #[test]
    fn rejects_unknown_timestamp_forms() {
        assert!(canonicalize_timestamp("yesterday at noon").is_none());
        assert!(canonicalize_timestamp("/Date()/").is_none());
        assert!(canonicalize_timestamp("").is_none());
    }

    #[test]
    fn stored_timestamps_parse_back_to_the_same_instant() {
        let now = fixed_now();
        assert_eq!(parse_timestamp(&format_timestamp(now)), Some(now));
        assert!(parse_timestamp("raw clock text").is_none());
    }

    #[test]
    fn normalize_applies_collector_defaults() {
        let record = RawRecord::default().normalize(fixed_now());
        assert_eq!(record.timestamp, "2024-03-01T12:00:00.000000Z");
        assert_eq!(record.event_id, 0);
        assert_eq!(record.level, "Information");
        assert_eq!(record.log_name, "Unknown");
        assert_eq!(record.provider, "Unknown");
        assert_eq!(record.message, "");
        assert_eq!(record.machine_name, "Unknown");
        assert_eq!(record.collected_at, "2024-03-01T12:00:00.000000Z");
    }

    #[test]
    fn normalize_retains_unparseable_timestamp_verbatim() {
        let raw = RawRecord {
            timestamp: Some("not a timestamp".to_string()),
            ..RawRecord::default()
        };
        assert_eq!(raw.normalize(fixed_now()).timestamp, "not a timestamp");
    }

    #[test]
    fn normalize_truncates_long_messages_on_char_boundaries() {
        let raw = RawRecord {
            message: Some("ü".repeat(MAX_MESSAGE_LEN + 50)),
            ..RawRecord::default()
        };
        let record = raw.normalize(fixed_now());
        assert_eq!(record.message.chars().count(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn decodes_agent_native_field_names() {
        let raw = RawRecord::from_value(json!({
            "TimeCreated": "/Date(1705314600000)/",
            "Id": 7036,
            "LevelDisplayName": "Error",
            "LogName": "System",
            "ProviderName": "Service Control Manager",
            "Message": "The Spooler service entered the stopped state.",
            "MachineName": "HOST-01"
        }))
        .unwrap();
        let record = raw.normalize(fixed_now());
        assert_eq!(record.timestamp, "2024-01-15T10:30:00.000000Z");
        assert_eq!(record.event_id, 7036);
        assert_eq!(record.level, "Error");
        assert_eq!(record.log_name, "System");
        assert_eq!(record.provider, "Service Control Manager");
        assert_eq!(record.machine_name, "HOST-01");
    }

    #[test]
    fn decodes_normalized_wire_names_with_source_alias() {
        let raw = RawRecord::from_value(json!({
            "timestamp": "2024-01-15T10:30:00Z",
            "level": "Warning",
            "source": "Application",
            "message": "disk nearly full"
        }))
        .unwrap();
        let record = raw.normalize(fixed_now());
        assert_eq!(record.level, "Warning");
        assert_eq!(record.log_name, "Application");
        assert_eq!(record.message, "disk nearly full");
    }

    #[test]
    fn non_object_candidate_is_malformed() {
        let err = RawRecord::from_value(json!("just a string")).unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnObject));
    }

    #[test]
    fn wrong_typed_field_is_malformed() {
        let err = RawRecord::from_value(json!({"event_id": "not a number"})).unwrap_err();
        assert!(matches!(err, NormalizeError::Decode(_)));
    }

    #[test]
    fn dedup_key_is_the_identifying_triple() {
        let raw = RawRecord {
            timestamp: Some("2024-01-15T10:30:00Z".to_string()),
            event_id: Some(42),
            provider: Some("Kernel-General".to_string()),
            ..RawRecord::default()
        };
        let record = raw.normalize(fixed_now());
        assert_eq!(
            record.dedup_key(),
            (
                "2024-01-15T10:30:00.000000Z".to_string(),
                42,
                "Kernel-General".to_string()
            )
        );
    }

    #[test]
    fn level_classification_ignores_case() {
        let mut record = RawRecord::default().normalize(fixed_now());
        record.level = "CRITICAL".to_string();
        assert!(record.is_error());
        record.level = "warning".to_string();
        assert!(record.is_warning());
        record.level = "Information".to_string();
        assert!(record.is_info());
        record.level = "Verbose".to_string();
        assert!(!record.is_error() && !record.is_warning() && !record.is_info());
    }
}
