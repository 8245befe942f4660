//! Photo description endpoints
//!
//! - `POST /api/describe`: multipart `image` → `InstrumentDescription` JSON
//! - `POST /api/describe/stream`: multipart `image` → SSE (phase `vision`)
//!
//! A declared content type other than `image/*` is rejected with 400
//! before any stream starts.

use axum::{
    extract::{Multipart, State},
    response::Response,
    routing::post,
    Json, Router,
};
use ivs_common::events::{Phase, PhaseResult};
use ivs_common::InstrumentDescription;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{conclude_run, report_failure, sse::event_stream};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::{EventSink, ImageUpload};
use crate::AppState;

/// Multipart field carrying the photo
pub const IMAGE_FIELD: &str = "image";

/// Pull the `image` field out of the form; other fields are ignored
pub async fn read_image_field(mut multipart: Multipart) -> ApiResult<ImageUpload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let declared_type = field.content_type().map(str::to_string);
        if !declared_type
            .as_deref()
            .is_some_and(|t| t.starts_with("image/"))
        {
            return Err(ApiError::BadRequest("Unsupported file type".to_string()));
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;

        return Ok(ImageUpload {
            bytes: bytes.to_vec(),
            declared_type,
            file_name,
        });
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{IMAGE_FIELD}'"
    )))
}

/// POST /api/describe
pub async fn describe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<InstrumentDescription>> {
    let upload = read_image_field(multipart).await?;
    let span = info_span!("describe", request_id = %Uuid::new_v4(), phase = "vision");

    async {
        match state.description.describe(upload).await {
            Ok(description) => Ok(Json(description)),
            Err(err) => {
                report_failure(&state, Phase::Vision, &err).await;
                Err(ApiError::from_pipeline(Phase::Vision, &err))
            }
        }
    }
    .instrument(span)
    .await
}

/// POST /api/describe/stream
pub async fn describe_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let upload = read_image_field(multipart).await?;
    let (sink, rx) = EventSink::channel(Phase::Vision);
    let span = info_span!("describe_stream", request_id = %Uuid::new_v4(), phase = "vision");

    tokio::spawn(
        async move {
            tracing::debug!(
                bytes = upload.bytes.len(),
                file_name = upload.file_name.as_deref().unwrap_or(""),
                "Description stream started"
            );
            let outcome = state
                .description
                .run(upload, &sink)
                .await
                .map(PhaseResult::Vision);
            conclude_run(&state, sink, outcome).await;
        }
        .instrument(span),
    );

    Ok(event_stream(rx))
}

pub fn describe_routes() -> Router<AppState> {
    Router::new()
        .route("/api/describe", post(describe))
        .route("/api/describe/stream", post(describe_stream))
}
