//! HTTP API handlers for ivs-api
//!
//! Synchronous endpoints return JSON; `/stream` endpoints run the same
//! pipeline on a spawned task and return its events as SSE.

pub mod describe;
pub mod estimate;
pub mod health;
pub mod sse;

pub use describe::describe_routes;
pub use estimate::estimate_routes;
pub use health::health_routes;

use ivs_common::events::{Phase, PhaseResult};
use tracing::{error, info, warn};

use crate::pipeline::{EventSink, PipelineError};
use crate::AppState;

/// Log a failed run; collaborator failures also become the service's
/// `last_error`.
pub(crate) async fn report_failure(state: &AppState, phase: Phase, err: &PipelineError) {
    match err {
        PipelineError::Disconnected => info!(%phase, "Client abandoned stream"),
        err if err.is_client_error() => warn!(%phase, error = %err, "Request rejected"),
        err => {
            error!(%phase, error = %err, "Pipeline failed");
            state.record_error(format!("{phase}: {err}")).await;
        }
    }
}

/// Finish a streamed run with its terminal event
pub(crate) async fn conclude_run(
    state: &AppState,
    sink: EventSink,
    outcome: Result<PhaseResult, PipelineError>,
) {
    if let Err(err) = &outcome {
        report_failure(state, sink.phase(), err).await;
    }
    sink.conclude(&outcome).await;
}
