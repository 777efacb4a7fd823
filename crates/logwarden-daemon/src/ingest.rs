//! Batch ingestion: normalize raw candidates, store them, publish the
//! records that turned out to be new.

use std::collections::HashSet;

use chrono::Utc;
use logwarden_core::record::{DedupKey, RawRecord};
use logwarden_core::{RecordStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::broadcast::Broadcaster;

/// Counters describing what one ingest batch amounted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Records written for the first time.
    pub inserted: u64,
    /// Records whose identity was already stored.
    pub duplicates: u64,
    /// Items that failed normalization and were dropped.
    pub skipped: u64,
}

/// Normalizes and stores a batch, broadcasting each record that is new.
///
/// `body` is one raw record object or an array of them. A malformed item
/// is counted and skipped; it never fails the rest of the batch. A later
/// item carrying a dedup key already seen in the same batch counts as a
/// duplicate without touching the store. Only a store failure aborts the
/// call.
pub fn ingest_batch(
    store: &RecordStore,
    broadcaster: &Broadcaster,
    body: Value,
) -> Result<IngestOutcome, StoreError> {
    let items = match body {
        Value::Array(items) => items,
        single => vec![single],
    };

    let now = Utc::now();
    let mut outcome = IngestOutcome::default();
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match RawRecord::from_value(item) {
            Ok(raw) => {
                let record = raw.normalize(now);
                if seen.insert(record.dedup_key()) {
                    records.push(record);
                } else {
                    outcome.duplicates += 1;
                }
            }
            Err(e) => {
                outcome.skipped += 1;
                warn!(error = %e, "skipping malformed ingest item");
            }
        }
    }

    let fresh = store.insert_records(&records)?;
    for (record, is_fresh) in records.iter().zip(&fresh) {
        if *is_fresh {
            outcome.inserted += 1;
            broadcaster.publish(record);
        } else {
            outcome.duplicates += 1;
        }
    }

    debug!(
        inserted = outcome.inserted,
        duplicates = outcome.duplicates,
        skipped = outcome.skipped,
        "ingest batch processed"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_item(event_id: i64, timestamp: &str) -> Value {
        json!({
            "timestamp": timestamp,
            "event_id": event_id,
            "level": "Error",
            "log_name": "System",
            "provider": "Service Control Manager",
            "message": "The Spooler service terminated unexpectedly",
            "machine_name": "HOST-01",
        })
    }

    #[test]
    fn single_object_body_is_accepted() {
        let store = RecordStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();

        let outcome =
            ingest_batch(&store, &broadcaster, raw_item(7034, "2024-03-01T10:00:00Z")).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome {
                inserted: 1,
                duplicates: 0,
                skipped: 0
            }
        );
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn repeated_batch_reports_duplicates() {
        let store = RecordStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let body = json!([
            raw_item(7034, "2024-03-01T10:00:00Z"),
            raw_item(7036, "2024-03-01T10:00:01Z"),
        ]);

        let first = ingest_batch(&store, &broadcaster, body.clone()).unwrap();
        assert_eq!(first.inserted, 2);

        let second = ingest_batch(&store, &broadcaster, body).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn same_key_twice_in_one_batch_counts_one_duplicate() {
        let store = RecordStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let body = json!([
            raw_item(7034, "2024-03-01T10:00:00Z"),
            raw_item(7034, "2024-03-01T10:00:00Z"),
        ]);

        let outcome = ingest_batch(&store, &broadcaster, body).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn malformed_items_are_skipped_not_fatal() {
        let store = RecordStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let body = json!([
            raw_item(7034, "2024-03-01T10:00:00Z"),
            "not an object",
            42,
        ]);

        let outcome = ingest_batch(&store, &broadcaster, body).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn fresh_records_are_broadcast_duplicates_are_not() {
        let store = RecordStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let (_, mut rx) = broadcaster.subscribe();

        let body = raw_item(7034, "2024-03-01T10:00:00Z");
        ingest_batch(&store, &broadcaster, body.clone()).unwrap();
        ingest_batch(&store, &broadcaster, body).unwrap();

        let pushed = rx.try_recv().unwrap();
        let record: serde_json::Value = serde_json::from_str(&pushed).unwrap();
        assert_eq!(record["event_id"], 7034);
        assert!(rx.try_recv().is_err(), "duplicate must not be re-broadcast");
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let store = RecordStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();

        let outcome = ingest_batch(&store, &broadcaster, json!({})).unwrap();
        assert_eq!(outcome.inserted, 1);

        let records = store.query(&Default::default(), 10).unwrap();
        assert_eq!(records[0].event_id, 0);
        assert_eq!(records[0].level, "Information");
        assert_eq!(records[0].log_name, "Unknown");
    }
}
