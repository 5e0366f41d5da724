use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::artifact::artifact_response;
use crate::job::{Snapshot, SnapshotError};
use crate::metrics::MetricsSnapshot;
use crate::probe::EncoderReport;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub async fn snapshot_url(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Result<Response, ApiError> {
    let url = match query.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => {
            return Err(ApiError::BadRequest(
                "query parameter `url` is required".to_string(),
            ))
        }
    };
    deliver(state.runner.snapshot_url(&url).await).await
}

pub async fn snapshot_twitter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    deliver(state.runner.snapshot_twitter(&id).await).await
}

pub async fn snapshot_pixiv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    deliver(state.runner.snapshot_pixiv(&id).await).await
}

pub async fn encoder(State(state): State<AppState>) -> Json<EncoderReport> {
    Json(state.prober.probe_all().await)
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    let gate = state.runner.gate();
    Json(
        state
            .runner
            .metrics()
            .snapshot(gate.capacity(), gate.available_permits()),
    )
}

async fn deliver(result: Result<Snapshot, SnapshotError>) -> Result<Response, ApiError> {
    Ok(artifact_response(result?).await?)
}
