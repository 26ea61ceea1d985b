//! Route tests for vpgmd, driven through the router without a socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vpgm_common::{Config, Dataset, FakeOracle, Oracle, TemplateDocument};
use vpgmd::{app, AppState};

const GOOD: &str = r#"{"template_id":"T","question_meta":{},"observed":{"options":["A","B"]},"latent_posteriors":{"L1":{"state_probabilities":{"x":0.6,"y":0.4},"justification":"r"}},"answer_posterior":{"option_probabilities":{"A":0.7,"B":0.3},"selected_answer":"A"}}"#;

fn config() -> Config {
    let mut config = Config::default();
    config.templates.default_id = "T".to_string();
    config.retry.max_attempts = 2;
    config.retry.backoff_ms = 0;
    config
}

fn templates() -> TemplateDocument {
    serde_json::from_value(json!({
        "templates": [{
            "id": "T",
            "verbal_cpd_templates": {"L1": "Estimate L1."},
            "instance_fields": {"template_id": "T", "latent_posteriors": {"L1": {}}}
        }]
    }))
    .unwrap()
}

fn dataset() -> Dataset {
    serde_json::from_value::<Vec<_>>(json!([
        {"question": "Which is a mammal?", "choices": ["A", "B"], "hint": "", "subject": "natural science", "topic": "biology"},
        {"question": "Which map shows Ohio?", "choices": ["A", "B"], "image": "map.png"},
        {"question": "Which is a reptile?", "choices": ["A", "B"], "context": "Reptiles lay eggs."}
    ]))
    .map(Dataset::new)
    .unwrap()
}

fn build(oracle: Arc<FakeOracle>) -> axum::Router {
    let oracle: Arc<dyn Oracle> = oracle;
    let state = AppState::new(&config(), templates(), dataset(), oracle).unwrap();
    app(Arc::new(state))
}

async fn send(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[test]
fn test_unknown_default_template_rejected_at_startup() {
    let mut config = config();
    config.templates.default_id = "nope".to_string();
    let oracle: Arc<dyn Oracle> = Arc::new(FakeOracle::always(GOOD));
    assert!(AppState::new(&config, templates(), dataset(), oracle).is_err());
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(build(Arc::new(FakeOracle::always(GOOD))), "GET", "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["template_id"], "T");
    assert_eq!(body["records_loaded"], 3);
}

/// Image-bearing questions never appear in listings
#[tokio::test]
async fn test_list_questions_skips_images() {
    let (status, body) = send(build(Arc::new(FakeOracle::always(GOOD))), "GET", "/api/questions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 20);
    assert_eq!(body["items"][0]["id"], "idx_0");
    assert_eq!(body["items"][1]["id"], "idx_2");
}

#[tokio::test]
async fn test_list_questions_search_and_paging() {
    let app = build(Arc::new(FakeOracle::always(GOOD)));
    let (_, body) = send(app.clone(), "GET", "/api/questions?search=REPTILE").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["question"], "Which is a reptile?");

    let (_, body) = send(app, "GET", "/api/questions?page=2&limit=1").await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["id"], "idx_2");
}

#[tokio::test]
async fn test_question_detail() {
    let (status, body) =
        send(build(Arc::new(FakeOracle::always(GOOD))), "GET", "/api/questions/idx_1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["raw_example"].get("image").is_none());
    assert_eq!(body["raw_example"]["question"], "Which map shows Ohio?");
    assert_eq!(body["skeleton"]["template_id"], "T");
    assert_eq!(body["skeleton"]["question_meta"]["scienceqa_id"], "idx_1");
    assert_eq!(body["skeleton"]["observed"]["options"], json!(["A", "B"]));
}

#[tokio::test]
async fn test_question_detail_unknown_is_404() {
    let (status, body) =
        send(build(Arc::new(FakeOracle::always(GOOD))), "GET", "/api/questions/idx_99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Question 'idx_99' not found");
}

#[tokio::test]
async fn test_infer_returns_instance() {
    let oracle = Arc::new(FakeOracle::always(format!("Here it is: {}", GOOD)));
    let (status, body) = send(build(Arc::clone(&oracle)), "POST", "/api/infer/idx_0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::from_str::<Value>(GOOD).unwrap());
    assert_eq!(oracle.call_count(), 1);
    assert!(oracle.prompts()[0].contains("Which is a mammal?"));
}

/// Exhausted retries surface as 500 with the attempt count
#[tokio::test]
async fn test_infer_exhausted_is_500() {
    let oracle = Arc::new(FakeOracle::always("no json here"));
    let (status, body) = send(build(Arc::clone(&oracle)), "POST", "/api/infer/idx_0").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["attempts"], 2);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Inference failed after 2 attempts"));
    assert_eq!(oracle.call_count(), 2);
}

#[tokio::test]
async fn test_infer_unknown_question_never_calls_oracle() {
    let oracle = Arc::new(FakeOracle::always(GOOD));
    let (status, _) = send(build(Arc::clone(&oracle)), "POST", "/api/infer/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(oracle.call_count(), 0);
}
