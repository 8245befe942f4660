//! Valuation endpoints
//!
//! - `POST /api/estimate`: `InstrumentDescription` JSON → `ValuationResult` JSON
//! - `POST /api/estimate/stream`: `InstrumentDescription` JSON → SSE (phase `rag`)

use axum::{extract::State, response::Response, routing::post, Json, Router};
use ivs_common::events::{Phase, PhaseResult};
use ivs_common::{InstrumentDescription, ValuationResult};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{conclude_run, report_failure, sse::event_stream};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::EventSink;
use crate::AppState;

/// POST /api/estimate
pub async fn estimate(
    State(state): State<AppState>,
    Json(description): Json<InstrumentDescription>,
) -> ApiResult<Json<ValuationResult>> {
    let span = info_span!("estimate", request_id = %Uuid::new_v4(), phase = "rag");

    async {
        match state.valuation.estimate(&description).await {
            Ok(valuation) => Ok(Json(valuation)),
            Err(err) => {
                report_failure(&state, Phase::Rag, &err).await;
                Err(ApiError::from_pipeline(Phase::Rag, &err))
            }
        }
    }
    .instrument(span)
    .await
}

/// POST /api/estimate/stream
pub async fn estimate_stream(
    State(state): State<AppState>,
    Json(description): Json<InstrumentDescription>,
) -> Response {
    let (sink, rx) = EventSink::channel(Phase::Rag);
    let span = info_span!("estimate_stream", request_id = %Uuid::new_v4(), phase = "rag");

    tokio::spawn(
        async move {
            let outcome = state
                .valuation
                .run(&description, &sink)
                .await
                .map(PhaseResult::Rag);
            conclude_run(&state, sink, outcome).await;
        }
        .instrument(span),
    );

    event_stream(rx)
}

pub fn estimate_routes() -> Router<AppState> {
    Router::new()
        .route("/api/estimate", post(estimate))
        .route("/api/estimate/stream", post(estimate_stream))
}
