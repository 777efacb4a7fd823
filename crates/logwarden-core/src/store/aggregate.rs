//! Grouped counts and time-bucketed histograms.
//!
//! Everything here runs under a single connection guard, so the total, the
//! per-dimension counts, and the histogram of one call all describe the
//! same filtered view of the store.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use super::RecordStore;
use crate::error::StoreResult;
use crate::filter::{Granularity, RecordFilter};
use crate::record::{format_timestamp, parse_timestamp};

/// Groups kept per dimension, largest counts first.
const TOP_GROUPS: usize = 10;

/// Group key reported when the stored value is empty.
const UNKNOWN_GROUP: &str = "UNKNOWN";

/// Counts over one filtered view of the store.
#[derive(Debug, Serialize)]
pub struct AggregationResult {
    pub total: u64,
    pub by_level: HashMap<String, u64>,
    pub by_log_name: HashMap<String, u64>,
    pub by_provider: HashMap<String, u64>,
    pub histogram: Vec<HistogramBucket>,
}

/// One histogram bucket; `bucket_start` is the truncated timestamp in
/// canonical RFC 3339.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct HistogramBucket {
    pub bucket_start: String,
    pub count: u64,
}

impl RecordStore {
    /// Compute the aggregation over the filtered view: total matching
    /// count, top-10 counts by level / log name / provider, and an
    /// ascending histogram of counts bucketed at the given granularity.
    ///
    /// Records whose stored timestamp does not parse belong to no bucket
    /// but still count toward the total.
    pub fn aggregate(
        &self,
        filter: &RecordFilter,
        granularity: Granularity,
    ) -> StoreResult<AggregationResult> {
        let (where_clause, params) = filter.to_sql();
        let conn = self.lock()?;

        let total = conn.query_row(
            &format!("SELECT COUNT(*) FROM log_records{where_clause}"),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;

        Ok(AggregationResult {
            total,
            by_level: group_counts(&conn, "level", &where_clause, &params)?,
            by_log_name: group_counts(&conn, "log_name", &where_clause, &params)?,
            by_provider: group_counts(&conn, "provider", &where_clause, &params)?,
            histogram: bucket_counts(&conn, &where_clause, &params, granularity)?,
        })
    }
}

fn group_counts(
    conn: &Connection,
    column: &str,
    where_clause: &str,
    params: &[Value],
) -> StoreResult<HashMap<String, u64>> {
    let sql = format!(
        "SELECT {column}, COUNT(*) AS n FROM log_records{where_clause}
         GROUP BY {column} ORDER BY n DESC LIMIT {TOP_GROUPS}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
    })?;
    let mut counts = HashMap::new();
    for row in rows {
        let (key, n) = row?;
        let key = if key.is_empty() {
            UNKNOWN_GROUP.to_string()
        } else {
            key
        };
        *counts.entry(key).or_insert(0) += n;
    }
    Ok(counts)
}

fn bucket_counts(
    conn: &Connection,
    where_clause: &str,
    params: &[Value],
    granularity: Granularity,
) -> StoreResult<Vec<HistogramBucket>> {
    let sql = format!("SELECT timestamp FROM log_records{where_clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        row.get::<_, String>(0)
    })?;

    let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    for row in rows {
        let raw = row?;
        let Some(ts) = parse_timestamp(&raw) else {
            continue;
        };
        *buckets.entry(granularity.truncate(ts)).or_insert(0) += 1;
    }

    Ok(buckets
        .into_iter()
        .map(|(start, count)| HistogramBucket {
            bucket_start: format_timestamp(start),
            count,
        })
        .collect())
}
