//! HTTP boundary
//!
//! Routes requests to the snapshot runner and the encoder prober, maps
//! errors to JSON responses and adds the cross-cutting layers.

pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;

pub use error::ApiError;

use std::sync::Arc;

use axum::http::header::{REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::job::SnapshotRunner;
use crate::probe::EncoderProber;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<SnapshotRunner>,
    pub prober: Arc<EncoderProber>,
}

impl AppState {
    pub fn new(runner: Arc<SnapshotRunner>, prober: Arc<EncoderProber>) -> Self {
        Self { runner, prober }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/url", get(handlers::snapshot_url))
        .route("/twitter/:id", get(handlers::snapshot_twitter))
        .route("/pixiv/:id", get(handlers::snapshot_pixiv))
        .route("/encoder", get(handlers::encoder))
        .route("/metrics", get(handlers::metrics))
        .route("/openapi.json", get(docs::openapi_json))
        .route("/docs", get(docs::swagger_ui))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::log_responses))
        .layer(axum::middleware::from_fn(middleware::set_request_context))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(CorsLayer::permissive())
}
