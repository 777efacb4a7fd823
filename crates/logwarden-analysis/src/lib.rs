//! # logwarden-analysis
//!
//! Anomaly and pattern analysis over batches of normalized log records.
//!
//! [`analyze`] runs two independent passes and a summary:
//!
//! - heuristic rules ([`rules`]): error-rate, repeated failure
//!   signatures and security bursts, each producing [`Warning`]s
//! - statistical outliers: messages are TF-IDF vectorized
//!   ([`vectorize`]) and clustered ([`cluster`]); records whose
//!   messages land outside every dense neighborhood come back as
//!   [`Anomaly`] entries
//!
//! Everything here is synchronous and CPU-bound. Callers decide where
//! it runs; with small batches a direct call is fine.

mod cluster;
mod rules;
mod vectorize;

pub use rules::{Severity, Warning, WarningKind};

use logwarden_core::record::{truncate_chars, LogRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outlier detection needs strictly more records than this to run.
const OUTLIER_MIN_BATCH: usize = 20;
/// Neighborhood radius for the clustering pass.
const CLUSTER_EPS: f64 = 0.5;
/// Neighborhood population (self included) that makes a point a core.
const CLUSTER_MIN_SAMPLES: usize = 3;
/// At most this many outliers are collected from one pass.
const MAX_ANOMALIES_COMPUTED: usize = 10;
/// At most this many outliers are reported to the caller.
const MAX_ANOMALIES_RETURNED: usize = 5;
/// Reported anomaly messages are clipped to this many characters.
const ANOMALY_MESSAGE_LEN: usize = 200;
/// Reason attached to every clustering outlier.
const ANOMALY_REASON: &str = "unusual log pattern detected";

/// Everything one analysis pass produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub warnings: Vec<Warning>,
    pub anomalies: Vec<Anomaly>,
    pub summary: Summary,
}

/// A record whose message does not resemble the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: String,
    pub level: String,
    pub log_name: String,
    pub message: String,
    pub reason: String,
}

/// Per-severity record counts for the analyzed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: u64,
    pub errors: u64,
    pub warnings: u64,
    pub info: u64,
}

/// Runs the full analysis over one batch.
///
/// An empty batch short-circuits to an empty result.
pub fn analyze(records: &[LogRecord]) -> AnalysisResult {
    if records.is_empty() {
        return AnalysisResult::default();
    }

    let mut warnings = Vec::new();
    if let Some(w) = rules::error_rate_warning(records) {
        warnings.push(w);
    }
    warnings.extend(rules::repeated_pattern_warnings(records));
    if let Some(w) = rules::security_burst_warning(records) {
        warnings.push(w);
    }

    AnalysisResult {
        warnings,
        anomalies: detect_outliers(records),
        summary: summarize(records),
    }
}

/// Counts records per severity class without running the rules.
pub fn summarize(records: &[LogRecord]) -> Summary {
    let mut summary = Summary {
        total: records.len() as u64,
        ..Summary::default()
    };
    for record in records {
        if record.is_error() {
            summary.errors += 1;
        } else if record.is_warning() {
            summary.warnings += 1;
        } else if record.is_info() {
            summary.info += 1;
        }
    }
    summary
}

/// Flags records whose messages cluster with nothing else in the batch.
fn detect_outliers(records: &[LogRecord]) -> Vec<Anomaly> {
    if records.len() <= OUTLIER_MIN_BATCH {
        return Vec::new();
    }
    let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
    let Some(vectors) = vectorize::vectorize(&messages) else {
        debug!(
            batch = records.len(),
            "no usable vocabulary, skipping outlier detection"
        );
        return Vec::new();
    };

    let labels = cluster::dbscan(&vectors, CLUSTER_EPS, CLUSTER_MIN_SAMPLES);
    let mut anomalies: Vec<Anomaly> = records
        .iter()
        .zip(&labels)
        .filter(|(_, label)| **label == cluster::NOISE)
        .take(MAX_ANOMALIES_COMPUTED)
        .map(|(record, _)| Anomaly {
            timestamp: record.timestamp.clone(),
            level: record.level.clone(),
            log_name: record.log_name.clone(),
            message: truncate_chars(&record.message, ANOMALY_MESSAGE_LEN),
            reason: ANOMALY_REASON.to_string(),
        })
        .collect();
    anomalies.truncate(MAX_ANOMALIES_RETURNED);
    anomalies
}
