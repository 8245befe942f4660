//! Server-Sent Events (SSE) wire format
//!
//! Each event is a block of lines terminated by a blank line: one `event:`
//! line naming the event and one or more `data:` lines carrying its JSON
//! body. Lines starting with `:` are comments (keep-alives) and are skipped.
//!
//! The service writes frames through axum; this module provides the same
//! encoding as plain text plus an incremental decoder used by the client.

use crate::events::{EventDecodeError, StreamEvent};

/// One dispatched SSE block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` line, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl SseFrame {
    /// Interpret this frame as a protocol event
    pub fn to_stream_event(&self) -> Result<StreamEvent, EventDecodeError> {
        let event_type = self.event.as_deref().unwrap_or("message");
        StreamEvent::from_parts(event_type, &self.data)
    }
}

/// Encode an event as an SSE block
///
/// Reference encoder for the wire format. The service itself writes frames
/// through `axum::response::sse::Event`; this is used to build test bodies
/// and by transports without an SSE writer of their own.
pub fn encode_event(event: &StreamEvent) -> serde_json::Result<String> {
    let data = event.data_json()?;
    let mut frame = format!("event: {}\n", event.event_type());
    for line in data.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    Ok(frame)
}

/// Incremental SSE decoder
///
/// Feed raw body chunks with [`SseDecoder::push`]; complete frames are
/// returned as soon as their terminating blank line arrives. Chunks may
/// split lines (and UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a final frame when the body ends without a trailing blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buf.is_empty() {
            let rest: Vec<u8> = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}
