//! End-to-end: the retry budget bounds the pipeline at three passes even when the
//! healer keeps asking for another try.

mod common;

use apiweave::{ChatRequest, MockDispatcher, MockGateway};
use common::harness;
use serde_json::json;

const PLAN: &str = r#"{"steps":[{"endpoint":"GET /store/inventory","params":{}}]}"#;
const EAGER_ADVICE: &str =
    r#"{"shouldRetry": true, "correctedQuery": "Show the store inventory", "analysis": "try again"}"#;
const NO_DELTAS: &str =
    r#"{"missingParameters": [], "parameterCorrections": [], "errorMessages": []}"#;

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_stops_after_three_passes() {
    let inventory =
        apiweave::NewEndpoint::new(apiweave::HttpMethod::Get, "/store/inventory", "inventory");
    let h = harness(
        vec![inventory],
        MockGateway::with_replies([
            PLAN,         // pass 1
            EAGER_ADVICE, // heal 1: analyst
            NO_DELTAS,    // heal 1: extractor
            PLAN,         // pass 2
            EAGER_ADVICE, // heal 2: analyst
            NO_DELTAS,    // heal 2: extractor
            PLAN,         // pass 3
        ]),
        MockDispatcher::always(500, json!({"error": "boom"})),
    )
    .await;

    let response = h
        .service
        .process(ChatRequest::new(h.project_id, "Show the inventory"))
        .await;

    assert!(!response.success);
    assert_eq!(response.execution_details.retry_count, 2);
    // Each pass dispatches twice (one 5xx retry); three passes total.
    assert_eq!(h.dispatcher.call_count(), 6);
    // Three planner calls plus two healer rounds of two calls each; the budget stops
    // a third healer round.
    assert_eq!(h.gateway.chat_calls(), 7);
    assert!(response.error.unwrap().contains("internal error"));
}
