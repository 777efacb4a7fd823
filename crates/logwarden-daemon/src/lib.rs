//! Daemon orchestration: ties the record store, broadcaster, HTTP/WS
//! API, retention sweeps, and periodic summaries into one async process.

pub mod api;
pub mod broadcast;
pub mod ingest;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use logwarden_core::config::LogwardenConfig;
use logwarden_core::record::format_timestamp;
use logwarden_core::{RecordFilter, RecordStore, StoreError};

use crate::api::{ApiLimits, AppState};
use crate::broadcast::Broadcaster;

/// The daemon process: one store, one broadcaster, one listener.
pub struct Daemon {
    config: LogwardenConfig,
    store: Arc<RecordStore>,
    broadcaster: Arc<Broadcaster>,
}

impl Daemon {
    /// Open the configured store and assemble the daemon around it.
    pub fn new(config: LogwardenConfig) -> Result<Self> {
        let store = RecordStore::open(&config.store.path).with_context(|| {
            format!("opening record store at {}", config.store.path.display())
        })?;
        Ok(Self {
            config,
            store: Arc::new(store),
            broadcaster: Arc::new(Broadcaster::new()),
        })
    }

    /// Serve the API until ctrl-c, with the retention sweep and summary
    /// tasks running alongside.
    pub async fn run(self) -> Result<()> {
        let state = AppState {
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            limits: ApiLimits::from_config(&self.config),
        };
        let app = api::router(state);

        let listener = tokio::net::TcpListener::bind(&self.config.server.listen)
            .await
            .with_context(|| format!("binding {}", self.config.server.listen))?;
        info!(addr = %self.config.server.listen, "daemon listening");

        let sweeper = spawn_retention_sweeper(
            self.store.clone(),
            self.config.store.retention_days,
            self.config.store.sweep_interval_secs,
        );
        let summarizer = spawn_summarizer(
            self.store.clone(),
            self.broadcaster.clone(),
            self.config.analysis.lookback_minutes,
            self.config.analysis.max_records,
            self.config.analysis.summary_interval_secs,
        );

        tokio::select! {
            result = axum::serve(listener, app).into_future() => {
                result.context("http server exited")?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
            }
        }

        if let Some(handle) = sweeper {
            handle.abort();
        }
        if let Some(handle) = summarizer {
            handle.abort();
        }
        Ok(())
    }

    /// One-shot retention sweep for the `sweep` subcommand.
    pub fn sweep(&self) -> Result<u64> {
        let deleted = sweep_once(&self.store, self.config.store.retention_days)?;
        Ok(deleted)
    }
}

/// Spawn the hourly (by default) retention sweep. The first tick fires
/// immediately so stale records do not survive a restart.
fn spawn_retention_sweeper(
    store: Arc<RecordStore>,
    retention_days: u32,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        info!("retention sweep disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(&store, retention_days) {
                Ok(0) => {}
                Ok(deleted) => {
                    info!(deleted, retention_days, "retention sweep removed records");
                }
                Err(e) => warn!(error = %e, "retention sweep failed"),
            }
        }
    }))
}

/// Delete records older than the retention window. A window reaching past
/// chrono's representable range deletes nothing.
pub fn sweep_once(store: &RecordStore, retention_days: u32) -> Result<u64, StoreError> {
    let cutoff = chrono::Duration::try_days(i64::from(retention_days))
        .and_then(|window| Utc::now().checked_sub_signed(window));
    match cutoff {
        Some(cutoff) => store.delete_older_than(&format_timestamp(cutoff)),
        None => Ok(0),
    }
}

/// Spawn the periodic summary publisher; `interval_secs == 0` disables it.
/// The immediate first tick is skipped so every summary covers a full
/// interval of traffic.
fn spawn_summarizer(
    store: Arc<RecordStore>,
    broadcaster: Arc<Broadcaster>,
    lookback_minutes: u32,
    max_records: usize,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        info!("periodic summaries disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if broadcaster.subscriber_count() == 0 {
                continue;
            }
            let since = Utc::now() - chrono::Duration::minutes(i64::from(lookback_minutes));
            let filter = RecordFilter {
                start: Some(format_timestamp(since)),
                ..RecordFilter::default()
            };
            match store.query(&filter, max_records) {
                Ok(records) => {
                    let summary = logwarden_analysis::summarize(&records);
                    broadcaster.publish(&summary);
                }
                Err(e) => warn!(error = %e, "summary query failed"),
            }
        }
    }))
}
