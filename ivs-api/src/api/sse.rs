//! SSE transport for pipeline events
//!
//! Drains a run's receiver in order. When the client disconnects axum drops
//! this stream, which drops the receiver and stops the run at its next
//! emission.

use axum::{
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use ivs_common::StreamEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

/// Interval between keep-alive comments
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn to_sse_event(event: &StreamEvent) -> Event {
    let event_type = event.event_type();
    match event.data_json() {
        Ok(data) => Event::default().event(event_type).data(data),
        Err(e) => {
            warn!(event_type, error = %e, "Failed to serialize stream event");
            Event::default()
                .event("error")
                .data(r#"{"message":"Event encoding failed"}"#)
        }
    }
}

/// `text/event-stream` response forwarding every event from `rx`
pub fn event_stream(rx: mpsc::Receiver<StreamEvent>) -> Response {
    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );

    ([(header::CACHE_CONTROL, "no-cache")], sse).into_response()
}
