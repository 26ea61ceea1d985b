//! End-to-end inference tests against a scripted oracle.

use std::time::Duration;

use serde_json::{json, Value};
use vpgm_common::{
    compile_prompt, extract_json, parse_reply, AttemptError, Dataset, ExtractionError, FakeOracle,
    NotFoundError, OracleParams, Orchestrator, QuestionRecord, RetryPolicy, Skeleton, Template,
    TemplateDocument, ValidationError, VpgmError,
};

const GOOD: &str = r#"{"template_id":"T","question_meta":{},"observed":{"options":["A","B"]},"latent_posteriors":{"L1":{"state_probabilities":{"x":0.6,"y":0.4},"justification":"r"}},"answer_posterior":{"option_probabilities":{"A":0.7,"B":0.3},"selected_answer":"A"}}"#;

fn templates() -> TemplateDocument {
    serde_json::from_value(json!({
        "templates": [{
            "id": "T",
            "description": "one latent",
            "verbal_cpd_templates": {"L1": "Estimate L1 from the question."},
            "instance_fields": {"template_id": "T", "latent_posteriors": {"L1": {}}}
        }]
    }))
    .unwrap()
}

fn record(question: &str, choices: &[&str]) -> QuestionRecord {
    serde_json::from_value(json!({
        "question": question,
        "choices": choices,
        "answer": 0,
        "hint": "",
        "subject": "natural science",
        "grade": "grade3",
    }))
    .unwrap()
}

fn skeleton(choices: &[&str]) -> Skeleton {
    Skeleton::from_record(&record("Pick one", choices), "T", Some("q1"))
}

fn no_wait(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::ZERO,
    }
}

/// A valid first reply is returned as-is after a single call
#[test]
fn test_valid_reply_accepted_on_first_call() {
    let docs = templates();
    let oracle = FakeOracle::always(GOOD);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(3));

    let instance = orch.infer(&docs, "T", &skeleton(&["A", "B"])).unwrap();

    let expected: Value = serde_json::from_str(GOOD).unwrap();
    assert_eq!(instance.as_value(), &expected);
    assert_eq!(instance.template_id(), "T");
    assert_eq!(instance.option_probability("B"), Some(0.3));
    assert_eq!(oracle.call_count(), 1);
}

/// Prose around the JSON object is tolerated
#[test]
fn test_reply_wrapped_in_prose() {
    let docs = templates();
    let oracle = FakeOracle::always(format!("Sure! Here is the result:\n{}\nHope this helps.", GOOD));
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(1));

    let instance = orch.infer(&docs, "T", &skeleton(&["A", "B"])).unwrap();
    assert_eq!(instance.selected_answer(), "A");
}

/// A permanently malformed oracle costs exactly max_attempts calls
#[test]
fn test_malformed_oracle_exhausts_budget() {
    let docs = templates();
    let oracle = FakeOracle::always("no json here");
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(3));

    let err = orch.infer(&docs, "T", &skeleton(&["A", "B"])).unwrap_err();

    assert_eq!(oracle.call_count(), 3);
    assert_eq!(err.attempts(), Some(3));
    assert!(err.to_string().starts_with("Inference failed after 3 attempts. Last error:"));
    match err {
        VpgmError::ExhaustedRetries { last, .. } => {
            assert!(matches!(last, AttemptError::Extraction(ExtractionError::NoObject)));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

/// Unknown templates fail before the oracle is ever called
#[test]
fn test_unknown_template_never_calls_oracle() {
    let docs = templates();
    let oracle = FakeOracle::always(GOOD);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(3));

    let err = orch.infer(&docs, "missing", &skeleton(&["A", "B"])).unwrap_err();

    assert!(matches!(
        err,
        VpgmError::NotFound(NotFoundError::Template(ref id)) if id == "missing"
    ));
    assert_eq!(err.to_string(), "Template with id 'missing' not found");
    assert_eq!(oracle.call_count(), 0);
}

/// A selected answer outside the question's options is rejected every time
#[test]
fn test_selected_answer_must_be_an_option() {
    let docs = templates();
    let reply = GOOD
        .replace(r#"["A","B"]"#, r#"["Dog","Cat"]"#)
        .replace(r#"{"A":0.7,"B":0.3}"#, r#"{"Dog":0.7,"Cat":0.3}"#)
        .replace(r#""selected_answer":"A""#, r#""selected_answer":"Fish""#);
    let oracle = FakeOracle::always(reply);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(2));

    let err = orch.infer(&docs, "T", &skeleton(&["Dog", "Cat"])).unwrap_err();

    match err {
        VpgmError::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(
                last,
                AttemptError::Validation(ValidationError::SelectedNotInOptions { .. })
            ));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

/// A later good reply rescues the run
#[test]
fn test_recovers_after_bad_replies() {
    let docs = templates();
    let oracle = FakeOracle::new(vec![
        Ok("no json here".to_string()),
        Ok(GOOD.replace("\"y\":0.4", "\"y\":0.5")),
        Ok(GOOD.to_string()),
    ]);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(3));

    assert!(orch.infer(&docs, "T", &skeleton(&["A", "B"])).is_ok());
    assert_eq!(oracle.call_count(), 3);
}

/// Batches keep input order and stop at the first failing item
#[test]
fn test_batch_stops_at_first_failure() {
    let docs = templates();
    let template = docs.resolve("T").unwrap();
    let oracle = FakeOracle::new(vec![
        Ok(GOOD.to_string()),
        Ok("garbage".to_string()),
        Ok(GOOD.to_string()),
    ]);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(1));

    let batch = vec![skeleton(&["A", "B"]), skeleton(&["A", "B"]), skeleton(&["A", "B"])];
    let err = orch.run_batch(&batch, template).unwrap_err();

    assert_eq!(err.attempts(), Some(1));
    assert_eq!(oracle.call_count(), 2);
}

#[test]
fn test_batch_all_succeed() {
    let docs = templates();
    let template = docs.resolve("T").unwrap();
    let oracle = FakeOracle::always(GOOD);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(1));

    let results = orch
        .run_batch(&[skeleton(&["A", "B"]), skeleton(&["A", "B"])], template)
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(orch.run_batch(&[], template).unwrap().is_empty());
}

#[test]
fn test_extract_handles_wrapped_and_missing_objects() {
    let wrapped = format!("Here you go:\n```json\n{}\n```", GOOD);
    assert_eq!(extract_json(&wrapped).unwrap(), GOOD);
    assert_eq!(
        parse_reply(&wrapped).unwrap(),
        serde_json::from_str::<Value>(GOOD).unwrap()
    );
    assert!(matches!(parse_reply("no json here"), Err(ExtractionError::NoObject)));
}

#[test]
fn test_compile_prompt_is_deterministic() {
    let docs = templates();
    let template: &Template = docs.resolve("T").unwrap();
    let sk = skeleton(&["A", "B"]);

    let first = compile_prompt(&sk, template);
    assert_eq!(first, compile_prompt(&sk, template));
    assert!(first.contains("\"question_text\": \"Pick one\""));
    assert!(first.contains("Estimate L1 from the question."));
    assert!(first.ends_with("Produce only valid JSON."));
}

/// The dataset feeds skeletons straight into the orchestrator
#[test]
fn test_dataset_to_instance() {
    let docs = templates();
    let dataset = Dataset::new(vec![record("Pick one", &["A", "B"])]);
    let sk = dataset.skeleton_for("idx_0", "T").unwrap();
    assert_eq!(sk.question_meta.scienceqa_id, "idx_0");

    let oracle = FakeOracle::always(GOOD);
    let orch = Orchestrator::new(&oracle, OracleParams::default()).with_policy(no_wait(1));
    let instance = orch.infer(&docs, "T", &sk).unwrap();
    assert_eq!(instance.latent_posteriors().count(), 1);
}
