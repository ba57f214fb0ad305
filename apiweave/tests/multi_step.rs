//! End-to-end: two-step plans with a cross-step reference, with and without early
//! termination, plus credential forwarding across steps.

mod common;

use apiweave::{AuthBlob, ChatRequest, HttpReply, MockDispatcher, MockGateway};
use common::{harness, orders_endpoint, user_endpoint, BASE_URL};
use serde_json::{json, Value};

const TWO_STEP_PLAN: &str = r#"{"steps":[
    {"endpoint":"GET /user/{username}","params":{"username":"john_doe"}},
    {"endpoint":"GET /orders","params":{"userId":"$.steps[0].response.id"}}
]}"#;

fn petstore_dispatcher() -> MockDispatcher {
    MockDispatcher::with_handler(|call| {
        let body = if call.url.path().starts_with("/user/") {
            json!({"id": 123, "username": "john_doe"})
        } else {
            json!([{"orderId": 7, "item": "leash"}])
        };
        Ok(HttpReply { status: 200, body })
    })
}

#[tokio::test]
async fn cross_step_reference_feeds_second_call() {
    // Reply script: plan, then the judge's NO after step 1.
    let h = harness(
        vec![user_endpoint(), orders_endpoint()],
        MockGateway::with_replies([TWO_STEP_PLAN, "NO"]),
        petstore_dispatcher(),
    )
    .await;

    let response = h
        .service
        .process(ChatRequest::new(
            h.project_id,
            "Get user john_doe and show his orders",
        ))
        .await;

    assert!(response.success, "error: {:?}", response.error);
    assert_eq!(response.execution_details.plan_steps, 2);
    assert_eq!(response.execution_details.steps_executed, 2);
    assert!(!response.execution_details.early_termination);

    let calls = h.dispatcher.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].url.as_str(), format!("{}/user/john_doe", BASE_URL));
    // id=123 from step 1 interpolated into step 2's query string.
    assert_eq!(
        calls[1].url.as_str(),
        format!("{}/orders?userId=123", BASE_URL)
    );

    // Final data is the last step's response.
    assert_eq!(response.data, Some(json!([{"orderId": 7, "item": "leash"}])));
}

#[tokio::test]
async fn judge_yes_after_first_step_short_circuits() {
    let h = harness(
        vec![user_endpoint(), orders_endpoint()],
        MockGateway::with_replies([TWO_STEP_PLAN, "YES"]),
        petstore_dispatcher(),
    )
    .await;

    let response = h
        .service
        .process(ChatRequest::new(h.project_id, "Get user john_doe"))
        .await;

    assert!(response.success);
    let details = &response.execution_details;
    assert!(details.early_termination);
    assert_eq!(details.plan_steps, 2);
    assert_eq!(details.steps_executed, 1);
    assert!(details.steps_executed < details.plan_steps);
    assert!(details
        .termination_reason
        .as_ref()
        .unwrap()
        .contains("Step 1 of 2"));

    // Only one outbound call was made; the orders step never ran.
    assert_eq!(h.dispatcher.call_count(), 1);
    assert_eq!(response.data, Some(json!({"id": 123, "username": "john_doe"})));
}

#[tokio::test]
async fn bearer_auth_is_forwarded_on_every_step() {
    let h = harness(
        vec![user_endpoint(), orders_endpoint()],
        MockGateway::with_replies([TWO_STEP_PLAN, "NO"]),
        petstore_dispatcher(),
    )
    .await;

    let request = ChatRequest::new(h.project_id, "Get user john_doe and show his orders")
        .with_auth(AuthBlob::Bearer {
            token: "secret-token".to_string(),
        });
    assert!(h.service.process(request).await.success);

    let calls = h.dispatcher.calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!(call.header("authorization"), Some("Bearer secret-token"));
    }
}

#[tokio::test]
async fn non_json_step_body_is_kept_verbatim_and_miss_fails_cleanly() {
    let h = harness(
        vec![user_endpoint(), orders_endpoint()],
        MockGateway::with_replies([TWO_STEP_PLAN, "NO"]),
        MockDispatcher::with_handler(|_| {
            Ok(HttpReply {
                status: 200,
                body: Value::String("<html>not json</html>".to_string()),
            })
        }),
    )
    .await;

    let response = h
        .service
        .process(ChatRequest::new(h.project_id, "Get user john_doe's orders"))
        .await;

    // The reference $.steps[0].response.id cannot resolve against a string body; the
    // run fails through the normal step-failure path (then exhausts healing).
    assert!(!response.success);
    assert!(response.error.is_some());
}
