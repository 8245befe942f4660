//! ivs-api library interface
//!
//! Exposes the router, state and pipelines for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod retrieval;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::pipeline::{DescriptionPipeline, ValuationPipeline};

/// Multipart framing allowance on top of the image size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub description: Arc<DescriptionPipeline>,
    pub valuation: Arc<ValuationPipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last collaborator failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(description: Arc<DescriptionPipeline>, valuation: Arc<ValuationPipeline>) -> Self {
        Self {
            description,
            valuation,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build application router
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let body_limit = server.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(api::health_routes())
        .merge(api::describe_routes())
        .merge(api::estimate_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
