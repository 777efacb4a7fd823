//! Heuristic rules that flag suspicious shapes in a record batch.
//!
//! Each rule scans the batch independently and emits zero or more
//! [`Warning`]s. Rules are deliberately cheap: a single pass over the
//! records, no allocation beyond the counters they need.

use std::collections::HashMap;
use std::sync::LazyLock;

use logwarden_core::record::LogRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Error share above which the batch is flagged, in percent.
const ERROR_RATE_THRESHOLD: f64 = 10.0;
/// A failure signature must occur strictly more often than this.
const REPEAT_THRESHOLD: u64 = 5;
/// Security-related records must occur strictly more often than this.
const SECURITY_BURST_THRESHOLD: u64 = 10;

/// Message substrings that mark a record as security-related.
const SECURITY_MARKERS: [&str; 3] = ["unauthorized", "denied", "failed login"];

static SERVICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][A-Za-z0-9_.-]*)\s+((?i:service|process))\b").expect("service pattern regex")
});

static ERROR_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error\s+code\s*:?\s*(\d+)").expect("error code regex"));

/// How strongly a warning should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Which heuristic produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ErrorRate,
    RepeatedPattern,
    SecurityBurst,
}

/// A single finding over the analyzed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
}

/// Flags the batch when more than [`ERROR_RATE_THRESHOLD`] percent of
/// records carry an error level.
pub(crate) fn error_rate_warning(records: &[LogRecord]) -> Option<Warning> {
    let errors = records.iter().filter(|r| r.is_error()).count();
    let rate = errors as f64 / records.len() as f64 * 100.0;
    if rate <= ERROR_RATE_THRESHOLD {
        return None;
    }
    Some(Warning {
        kind: WarningKind::ErrorRate,
        severity: Severity::High,
        message: format!(
            "high error rate: {rate:.1}% of {} records are errors",
            records.len()
        ),
    })
}

/// Groups error records by failure signature and flags signatures that
/// repeat more than [`REPEAT_THRESHOLD`] times.
///
/// Two signature forms are extracted from each error message: a
/// `"Name service"` / `"Name process"` subject and a numeric
/// `"error code N"`. A message can contribute both.
pub(crate) fn repeated_pattern_warnings(records: &[LogRecord]) -> Vec<Warning> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in records.iter().filter(|r| r.is_error()) {
        if let Some(caps) = SERVICE_PATTERN.captures(&record.message) {
            let signature = format!("{} {}", &caps[1], caps[2].to_lowercase());
            *counts.entry(signature).or_insert(0) += 1;
        }
        if let Some(caps) = ERROR_CODE_PATTERN.captures(&record.message) {
            let signature = format!("error code {}", &caps[1]);
            *counts.entry(signature).or_insert(0) += 1;
        }
    }

    let mut repeated: Vec<(String, u64)> = counts
        .into_iter()
        .filter(|(_, n)| *n > REPEAT_THRESHOLD)
        .collect();
    // Highest count first; ties break on the signature so output is stable.
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    repeated
        .into_iter()
        .map(|(signature, n)| Warning {
            kind: WarningKind::RepeatedPattern,
            severity: Severity::Medium,
            message: format!("repeated failure: \"{signature}\" occurred {n} times"),
        })
        .collect()
}

/// Flags a burst of security-related records.
///
/// A record counts when its log name contains `Security` or its message
/// contains one of [`SECURITY_MARKERS`] (case-insensitive).
pub(crate) fn security_burst_warning(records: &[LogRecord]) -> Option<Warning> {
    let hits = records.iter().filter(|r| is_security_related(r)).count() as u64;
    if hits <= SECURITY_BURST_THRESHOLD {
        return None;
    }
    Some(Warning {
        kind: WarningKind::SecurityBurst,
        severity: Severity::High,
        message: format!("security event burst: {hits} security-related records in window"),
    })
}

fn is_security_related(record: &LogRecord) -> bool {
    if record.log_name.contains("Security") {
        return true;
    }
    let message = record.message.to_lowercase();
    SECURITY_MARKERS.iter().any(|m| message.contains(m))
}
