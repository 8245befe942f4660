//! HTTP endpoint tests against the router with fake collaborators

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use helpers::*;
use ivs_common::events::{check_sequence, log_codes, LogEvent, MetaValue, StepStatus};
use ivs_common::{InstrumentDescription, Phase, PhaseResult, StreamEvent, ValuationResult};
use serde_json::{json, Value};
use tower::ServiceExt;

fn description_json() -> Value {
    json!({
        "category": "Electric guitar",
        "brand": "Fender",
        "model": "Stratocaster",
        "materials": ["alder"],
        "features": []
    })
}

fn log_codes_of(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Log(LogEvent { code, .. }) => Some(code.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_health_reports_module_and_no_error() {
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );
    let response = test_router(state)
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ivs-api");
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_describe_returns_description() {
    let vision = FakeVision::new(Behavior::text(DESCRIPTION_REPLY));
    let state = test_state(
        vision.clone(),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );

    let response = test_router(state)
        .oneshot(multipart_request("/api/describe", "image", "image/jpeg", PNG_BYTES))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let description: InstrumentDescription =
        serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(description.brand, "Fender");
    assert_eq!(description.year, None);
    assert_eq!(description.materials, vec!["alder", "maple"]);

    // Sniffed PNG wins over the declared JPEG
    let urls = vision.seen_urls.lock().unwrap();
    assert!(urls[0].starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_describe_rejects_non_image_content_type() {
    let vision = FakeVision::new(Behavior::text(DESCRIPTION_REPLY));
    let state = test_state(
        vision.clone(),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );

    for uri in ["/api/describe", "/api/describe/stream"] {
        let response = test_router(state.clone())
            .oneshot(multipart_request(uri, "image", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_text(response).await, "Unsupported file type");
    }
    assert!(vision.seen_urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_describe_requires_image_field() {
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );
    let response = test_router(state)
        .oneshot(multipart_request("/api/describe", "photo", "image/png", PNG_BYTES))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("image"));
}

#[tokio::test]
async fn test_describe_stream_emits_ordered_events() {
    let state = test_state(
        FakeVision::new(Behavior::narrated(DESCRIPTION_REPLY)),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );

    let response = test_router(state)
        .oneshot(multipart_request("/api/describe/stream", "image", "image/png", PNG_BYTES))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let events = read_events(response).await;
    assert_eq!(check_sequence(Phase::Vision, &events), Ok(()));

    assert_eq!(events[0], StreamEvent::step(Phase::Vision, 0, StepStatus::Start));
    assert_eq!(
        log_codes_of(&events),
        vec![
            log_codes::VISION_UPLOAD_RECEIVED,
            log_codes::VISION_IMAGE_ENCODED,
            log_codes::VISION_REQUEST_SENT,
            log_codes::VISION_REASONING,
            log_codes::VISION_USAGE,
            log_codes::VISION_RESPONSE_PARSED,
        ]
    );

    match &events[1] {
        StreamEvent::Log(LogEvent { meta: Some(meta), .. }) => {
            assert_eq!(meta["bytes"], MetaValue::Integer(PNG_BYTES.len() as i64));
        }
        other => panic!("expected upload log, got {other:?}"),
    }

    let steps_done = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Step(s) if s.status == StepStatus::Done))
        .count();
    assert_eq!(steps_done, 4);

    match events.last().unwrap() {
        StreamEvent::Result(PhaseResult::Vision(description)) => {
            assert_eq!(description.model, "Stratocaster");
        }
        other => panic!("expected vision result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_describe_stream_model_failure_is_generic_and_recorded() {
    let state = test_state(
        FakeVision::new(Behavior::Fail),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );
    let app = test_router(state);

    let response = app
        .clone()
        .oneshot(multipart_request("/api/describe/stream", "image", "image/png", PNG_BYTES))
        .await
        .unwrap();
    let events = read_events(response).await;

    assert_eq!(check_sequence(Phase::Vision, &events), Ok(()));
    assert_eq!(events.last(), Some(&StreamEvent::error("VLM request failed")));
    // Step 2 never completes
    assert!(!events.contains(&StreamEvent::step(Phase::Vision, 2, StepStatus::Done)));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Result(_))));

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(body["last_error"].as_str().unwrap().starts_with("vision:"));
}

#[tokio::test]
async fn test_describe_stream_unparseable_reply_carries_message() {
    let state = test_state(
        FakeVision::new(Behavior::text("I cannot tell what this is.")),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );
    let response = test_router(state)
        .oneshot(multipart_request("/api/describe/stream", "image", "image/png", PNG_BYTES))
        .await
        .unwrap();

    let events = read_events(response).await;
    assert_eq!(
        events.last(),
        Some(&StreamEvent::error("No JSON object found in response"))
    );
    assert!(events.contains(&StreamEvent::step(Phase::Vision, 3, StepStatus::Start)));
    assert!(!events.contains(&StreamEvent::step(Phase::Vision, 3, StepStatus::Done)));
}

#[tokio::test]
async fn test_describe_stream_rejects_disguised_payload() {
    let vision = FakeVision::new(Behavior::text(DESCRIPTION_REPLY));
    let state = test_state(
        vision.clone(),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::with_docs(vec![]),
    );
    let pdf = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
    let response = test_router(state)
        .oneshot(multipart_request("/api/describe/stream", "image", "image/png", pdf))
        .await
        .unwrap();

    let events = read_events(response).await;
    match events.last() {
        Some(StreamEvent::Error(e)) => assert!(e.message.starts_with("Unsupported file type")),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(vision.seen_urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_estimate_stream_with_zero_references_still_returns_result() {
    let reasoning = FakeReasoning::new(Behavior::text(VALUATION_REPLY));
    let store = FakeStore::with_docs(vec![]);
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        reasoning.clone(),
        store.clone(),
    );

    let response = test_router(state)
        .oneshot(json_request("/api/estimate/stream", &description_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = read_events(response).await;
    assert_eq!(check_sequence(Phase::Rag, &events), Ok(()));

    let retrieve_done = events.iter().find_map(|e| match e {
        StreamEvent::Log(LogEvent { code, meta: Some(meta) }) if code == log_codes::RAG_RETRIEVE_DONE => {
            Some(meta["count"].clone())
        }
        _ => None,
    });
    assert_eq!(retrieve_done, Some(MetaValue::Integer(0)));

    match events.last().unwrap() {
        StreamEvent::Result(PhaseResult::Rag(valuation)) => {
            assert_eq!(valuation.price_jpy, 120_000);
            assert!(valuation.range_jpy.0 <= valuation.price_jpy);
            assert!(valuation.price_jpy <= valuation.range_jpy.1);
        }
        other => panic!("expected rag result, got {other:?}"),
    }

    let queries = store.queries.lock().unwrap();
    assert_eq!(
        queries[0],
        (
            "category: Electric guitar\nbrand: Fender\nmodel: Stratocaster\nmaterials: alder".to_string(),
            TOP_K
        )
    );
    let calls = reasoning.calls.lock().unwrap();
    assert_eq!(calls[0].1, "");
}

#[tokio::test]
async fn test_estimate_passes_context_to_model() {
    let reasoning = FakeReasoning::new(Behavior::text(VALUATION_REPLY));
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        reasoning.clone(),
        FakeStore::with_docs(vec![reference(
            "Fender American Standard Stratocaster 2012",
            148_000,
            "Sunburst, light wear",
        )]),
    );

    let response = test_router(state)
        .oneshot(json_request("/api/estimate", &description_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let valuation: ValuationResult = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(valuation.evidence.len(), 1);

    let calls = reasoning.calls.lock().unwrap();
    assert_eq!(
        calls[0].1,
        "- Fender American Standard Stratocaster 2012 | price_jpy: 148000 | source: used shop listing\n  Sunburst, light wear"
    );
}

#[tokio::test]
async fn test_estimate_invalid_valuation_is_bad_request() {
    let reply = "{\"price_jpy\": 50000, \"range_jpy\": [60000, 90000], \"confidence\": 0.5, \
                 \"rationale\": \"r\", \"evidence\": []}";
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        FakeReasoning::new(Behavior::text(reply)),
        FakeStore::with_docs(vec![]),
    );

    let response = test_router(state)
        .oneshot(json_request("/api/estimate", &description_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.starts_with("ValuationResult validation failed: range_jpy"), "{body}");
}

#[tokio::test]
async fn test_estimate_retrieval_failure_is_server_error() {
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        FakeStore::failing(),
    );
    let response = test_router(state)
        .oneshot(json_request("/api/estimate", &description_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "RAG request failed");
}

#[tokio::test]
async fn test_estimate_stream_empty_description_errors() {
    let store = FakeStore::with_docs(vec![]);
    let state = test_state(
        FakeVision::new(Behavior::text(DESCRIPTION_REPLY)),
        FakeReasoning::new(Behavior::text(VALUATION_REPLY)),
        store.clone(),
    );
    let response = test_router(state)
        .oneshot(json_request("/api/estimate/stream", &json!({})))
        .await
        .unwrap();

    let events = read_events(response).await;
    assert_eq!(
        events,
        vec![
            StreamEvent::step(Phase::Rag, 0, StepStatus::Start),
            StreamEvent::log(log_codes::RAG_QUERY_BUILD),
            StreamEvent::error("Instrument description is empty"),
        ]
    );
    assert!(store.queries.lock().unwrap().is_empty());
}
