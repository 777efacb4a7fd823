//! HTTP and WebSocket surface of the daemon.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use logwarden_core::config::LogwardenConfig;
use logwarden_core::record::format_timestamp;
use logwarden_core::{Granularity, RecordFilter, RecordStore, StoreError};

use crate::broadcast::Broadcaster;
use crate::ingest;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub limits: ApiLimits,
}

/// Request-shaping knobs lifted out of the configuration.
#[derive(Debug, Clone, Copy)]
pub struct ApiLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub lookback_minutes: u32,
    pub max_analysis_records: usize,
}

impl ApiLimits {
    pub fn from_config(config: &LogwardenConfig) -> Self {
        Self {
            default_page_size: config.server.default_page_size,
            max_page_size: config.server.max_page_size,
            lookback_minutes: config.analysis.lookback_minutes,
            max_analysis_records: config.analysis.max_records,
        }
    }
}

#[derive(Deserialize)]
struct PageParams {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct StatsParams {
    granularity: Option<String>,
}

#[derive(Deserialize)]
struct AnalysisParams {
    minutes: Option<i64>,
}

#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    inserted: u64,
    duplicates: u64,
    skipped: u64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Build the router; [`crate::Daemon::run`] binds it, tests drive it
/// directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/logs", get(list_handler))
        .route("/api/logs/ingest", post(ingest_handler))
        .route("/api/logs/stats", get(stats_handler))
        .route("/api/logs/analysis", get(analysis_handler))
        .route("/ws/logs", get(ws_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn ingest_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    match ingest::ingest_batch(&state.store, &state.broadcaster, body) {
        Ok(outcome) => Json(IngestResponse {
            status: "ok",
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            skipped: outcome.skipped,
        })
        .into_response(),
        Err(e) => service_unavailable(e),
    }
}

async fn list_handler(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
    Query(page): Query<PageParams>,
) -> Response {
    let limit = page
        .limit
        .unwrap_or(state.limits.default_page_size)
        .min(state.limits.max_page_size);
    match state.store.query(&filter, limit) {
        Ok(records) => Json(records).into_response(),
        Err(e) => service_unavailable(e),
    }
}

async fn stats_handler(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
    Query(params): Query<StatsParams>,
) -> Response {
    let granularity = params
        .granularity
        .as_deref()
        .map(Granularity::parse_lossy)
        .unwrap_or_default();
    match state.store.aggregate(&filter, granularity) {
        Ok(result) => Json(result).into_response(),
        Err(e) => service_unavailable(e),
    }
}

async fn analysis_handler(
    State(state): State<AppState>,
    Query(mut filter): Query<RecordFilter>,
    Query(params): Query<AnalysisParams>,
) -> Response {
    // `minutes` sets the lookback unless the caller bounded `start` herself.
    // A lookback outside chrono's representable range leaves the window
    // unbounded instead.
    if filter.start.is_none() {
        let minutes = params
            .minutes
            .unwrap_or(i64::from(state.limits.lookback_minutes));
        filter.start = Duration::try_minutes(minutes)
            .and_then(|lookback| Utc::now().checked_sub_signed(lookback))
            .map(format_timestamp);
    }
    match state.store.query(&filter, state.limits.max_analysis_records) {
        Ok(records) => Json(logwarden_analysis::analyze(&records)).into_response(),
        Err(e) => service_unavailable(e),
    }
}

async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| attach_subscriber(socket, state.broadcaster.clone()))
}

/// Pump broadcast messages into the socket until either side goes away.
/// Inbound frames are drained and ignored.
async fn attach_subscriber(mut socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (id, mut rx) = broadcaster.subscribe();
    loop {
        tokio::select! {
            queued = rx.recv() => {
                let Some(json) = queued else { break };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(subscriber = id, "websocket send failed");
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    broadcaster.unsubscribe(id);
}

fn service_unavailable(e: StoreError) -> Response {
    warn!(error = %e, "store unavailable, rejecting request");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: format!("{e}"),
        }),
    )
        .into_response()
}
