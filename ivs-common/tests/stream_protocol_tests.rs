//! Whole-stream protocol tests: encode a phase's events as SSE text, decode
//! them back chunk by chunk, and check the ordering rules hold.

use ivs_common::events::{check_sequence, log_codes, LogMeta, MetaValue, StepStatus};
use ivs_common::sse::{encode_event, SseDecoder};
use ivs_common::{Phase, PhaseResult, StreamEvent, ValuationResult};

fn rag_success_stream() -> Vec<StreamEvent> {
    let mut meta = LogMeta::new();
    meta.insert("count".into(), MetaValue::from(4usize));

    let mut events = Vec::new();
    events.push(StreamEvent::step(Phase::Rag, 0, StepStatus::Start));
    events.push(StreamEvent::log(log_codes::RAG_QUERY_BUILD));
    events.push(StreamEvent::step(Phase::Rag, 0, StepStatus::Done));
    events.push(StreamEvent::step(Phase::Rag, 1, StepStatus::Start));
    events.push(StreamEvent::log(log_codes::RAG_RETRIEVE_START));
    events.push(StreamEvent::log_with(log_codes::RAG_RETRIEVE_DONE, meta));
    events.push(StreamEvent::step(Phase::Rag, 1, StepStatus::Done));
    events.push(StreamEvent::step(Phase::Rag, 2, StepStatus::Start));
    events.push(StreamEvent::step(Phase::Rag, 2, StepStatus::Done));
    events.push(StreamEvent::step(Phase::Rag, 3, StepStatus::Start));
    events.push(StreamEvent::step(Phase::Rag, 3, StepStatus::Done));
    events.push(StreamEvent::Result(PhaseResult::Rag(ValuationResult {
        price_jpy: 85_000,
        range_jpy: (70_000, 100_000),
        confidence: 0.6,
        rationale: "Comparable listings".into(),
        evidence: vec!["Yamaha Pacifica 112V sold at 30,000 JPY".into()],
    })));
    events
}

#[test]
fn test_stream_survives_arbitrary_chunking() {
    let events = rag_success_stream();
    let mut body = String::new();
    for event in &events {
        body.push_str(&encode_event(event).unwrap());
        body.push_str(": keep-alive\n\n");
    }

    for chunk_size in [1usize, 3, 7, 64, body.len()] {
        let mut decoder = SseDecoder::new();
        let mut decoded = Vec::new();
        for chunk in body.as_bytes().chunks(chunk_size) {
            for frame in decoder.push(chunk) {
                decoded.push(frame.to_stream_event().unwrap());
            }
        }
        assert!(decoder.finish().is_none());
        assert_eq!(decoded, events, "chunk size {chunk_size}");
        assert_eq!(check_sequence(Phase::Rag, &decoded), Ok(()));
    }
}

#[test]
fn test_stream_ends_with_single_terminal() {
    let events = rag_success_stream();
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(events.last().unwrap().is_terminal());
}
