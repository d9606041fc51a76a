use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedback360::generator::{
    GeneratorConfig, GeneratorError, NarrativeGenerator, OpenRouterGenerator, RetryingGenerator,
};
use feedback360::model::{Competency, Response};
use feedback360::narrative::{NarrativeConfig, NarrativeGenerationError, NarrativeSynthesizer};
use feedback360::scoring::{compute, Scorecard};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const REPLY: &str = "\
===EXECUTIVE_SUMMARY===
Ana is a trusted listener.
===CATEGORY_ANALYSIS===
Communication is the strongest area; Leadership trails.
===DEVELOPMENT_PRACTICES===
COMPETENCY: Delegates work
OBJECTIVE: Hand off one project per quarter
DESCRIPTION: Pick a project and coach the owner.
PARTICIPANTS: Ana and one direct report
DURATION: 3 months
KPI: Projects delivered without escalation
---
===CONCLUSIONS===
Keep listening; start delegating.";

fn scorecard() -> Scorecard {
    let comp = |id, cat: &str, text: &str| Competency {
        id,
        category_id: 0,
        category_name: cat.into(),
        self_text: text.into(),
        feedback_text: text.into(),
        position: id,
    };
    let competencies = vec![
        comp(1, "Communication", "Listens actively"),
        comp(2, "Leadership", "Delegates work"),
    ];
    let responses = vec![
        Response::self_assessment(7, 1, 4),
        Response::feedback(7, 9, 1, 5),
        Response::self_assessment(7, 2, 4),
        Response::feedback(7, 9, 2, 2),
    ];
    compute(&responses, &competencies).unwrap()
}

fn completion(content: &str, finish_reason: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "content": content },
            "finish_reason": finish_reason
        }],
        "usage": { "prompt_tokens": 120, "completion_tokens": 80 }
    })
}

fn synthesizer(server: &MockServer) -> NarrativeSynthesizer {
    let adapter =
        OpenRouterGenerator::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None)
            .unwrap();
    let generator = RetryingGenerator::with_config(
        adapter,
        GeneratorConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
        },
    );
    NarrativeSynthesizer::new(Arc::new(generator), NarrativeConfig::default())
}

#[tokio::test]
async fn narrative_round_trip_through_openrouter() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Ana Ruiz"))
        .and(body_string_contains("google/gemini-2.5-flash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPLY, "stop")))
        .expect(1)
        .mount(&server)
        .await;

    let bundle = synthesizer(&server)
        .synthesize("Ana Ruiz", &scorecard())
        .await
        .unwrap();

    assert!(bundle.is_available());
    assert!(!bundle.truncated);
    assert_eq!(bundle.model, "google/gemini-2.5-flash");
    assert_eq!(
        bundle.sections.executive_summary.as_deref(),
        Some("Ana is a trusted listener.")
    );
    assert_eq!(bundle.practices.len(), 1);
    let practice = bundle.practice_for("Delegates work").unwrap();
    assert_eq!(practice.duration, "3 months");
}

#[tokio::test]
async fn length_finish_reason_marks_bundle_truncated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "===EXECUTIVE_SUMMARY===\nAna is a trusted",
            "length",
        )))
        .mount(&server)
        .await;

    let bundle = synthesizer(&server)
        .synthesize("Ana Ruiz", &scorecard())
        .await
        .unwrap();
    assert!(bundle.truncated);
    assert_eq!(bundle.sections.found(), 1);
    assert!(bundle.sections.conclusions.is_none());
}

#[tokio::test]
async fn reply_without_markers_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("Here is a lovely essay about Ana.", "stop")),
        )
        .mount(&server)
        .await;

    let err = synthesizer(&server)
        .synthesize("Ana Ruiz", &scorecard())
        .await
        .unwrap_err();
    assert!(matches!(err, NarrativeGenerationError::NoSections { .. }));
    assert!(err.is_retryable());
}

#[derive(Clone)]
struct FailThenSucceed {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(502).set_body_json(json!({
                "error": { "message": "bad gateway", "code": 502 }
            }))
        } else {
            ResponseTemplate::new(200).set_body_json(completion(REPLY, "stop"))
        }
    }
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FailThenSucceed {
            calls: calls.clone(),
            failures: 2,
        })
        .mount(&server)
        .await;

    let bundle = synthesizer(&server)
        .synthesize("Ana Ruiz", &scorecard())
        .await
        .unwrap();
    assert!(bundle.is_available());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(move |_: &Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "unknown model", "code": "model_not_found" }
            }))
        })
        .mount(&server)
        .await;

    let err = synthesizer(&server)
        .synthesize("Ana Ruiz", &scorecard())
        .await
        .unwrap_err();
    match err {
        NarrativeGenerationError::Generator(GeneratorError::InvalidRequest { message, context }) => {
            assert_eq!(message, "unknown model");
            let context = context.unwrap();
            assert_eq!(context.http_status, Some(400));
            assert_eq!(context.upstream_code.as_deref(), Some("model_not_found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refusal_is_reported_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("I cannot write a report about a person.", "stop")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter =
        OpenRouterGenerator::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None)
            .unwrap();
    let generator = RetryingGenerator::new(adapter);
    let req = feedback360::generator::GenerationRequest::new(
        "google/gemini-2.5-flash",
        vec![feedback360::generator::Message::user("hi")],
        "test",
    );
    let err = generator.generate(req).await.unwrap_err();
    assert!(matches!(err, GeneratorError::Refused { .. }));
}
