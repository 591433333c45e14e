use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use shared::types::{Device, LogEntry, StoreSummary};
use crate::ingest::{IngestStats, StatsSnapshot};
use crate::store_manager::StoreHandle;

const DEFAULT_LOG_LIMIT: u32 = 50;
const MAX_LOG_LIMIT: u32 = 1000;
const RECENT_WINDOW_HOURS: i64 = 24;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub stats: Arc<IngestStats>,
}

#[derive(Deserialize)]
pub struct LogQuery {
    pub limit: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/devices", get(list_devices))
        .route("/v1/devices/:ip", get(get_device))
        .route("/v1/devices/:ip/logs", get(get_device_logs))
        .route("/v1/stats", get(get_stats))
        .route("/v1/summary", get(get_summary))
        .with_state(state)
}

async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<Device>>, StatusCode> {
    state
        .store
        .list_devices()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query devices: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_device(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<Device>, StatusCode> {
    state
        .store
        .get_device(ip)
        .await
        .map_err(|e| {
            tracing::error!("Failed to query device: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_device_logs(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    Query(params): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);

    let known = state.store.get_device(ip.clone()).await.map_err(|e| {
        tracing::error!("Failed to query device: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if known.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    state
        .store
        .recent_entries(ip, limit)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query log entries: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

async fn get_summary(State(state): State<AppState>) -> Result<Json<StoreSummary>, StatusCode> {
    let since = Utc::now() - Duration::hours(RECENT_WINDOW_HOURS);

    state
        .store
        .summary(since)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to summarize store: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
