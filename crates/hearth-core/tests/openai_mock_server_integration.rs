use std::sync::Arc;

use hearth_core::*;
use hearth_memory::{FileTranscriptStore, TranscriptStore};
use hearth_provider::{LlmProvider, OpenAiProvider};
use hearth_schema::{ChatRequest, Role, Strategy};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_openai_response(content: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": {"content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 17}
    })
}

fn reply_json(first: &str, second: &str) -> String {
    serde_json::json!({
        "segments": [
            {"text": first, "strategies": ["validation", "empathy"]},
            {"text": second, "strategies": ["open_ended_questions"]}
        ]
    })
    .to_string()
}

fn provider(server: &MockServer) -> Arc<dyn LlmProvider> {
    Arc::new(OpenAiProvider::new("test-key", server.uri()))
}

#[tokio::test]
async fn gateway_sends_strict_schema_and_parses_segments() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-2024-08-06",
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "therapist_response", "strict": true}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_openai_response(Some(
            &reply_json("That sounds exhausting.", "What has been weighing on you?"),
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = CompletionGateway::new(provider(&server), DEFAULT_MODEL);
    let completion = gateway.complete(&[], "I'm so tired").await.unwrap();

    assert_eq!(
        completion.content,
        "That sounds exhausting. What has been weighing on you?"
    );
    assert_eq!(
        completion.segments[0].strategies,
        vec![Strategy::Validation, Strategy::Empathy]
    );
}

#[tokio::test]
async fn controller_round_trips_through_mock_server_and_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_openai_response(Some(
            &reply_json("I hear you.", "Tell me more?"),
        ))))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileTranscriptStore::new(dir.path()));
    let controller = SessionController::stateful(
        CompletionGateway::new(provider(&server), DEFAULT_MODEL),
        store.clone(),
    );

    let first = controller
        .handle(ChatRequest::new("work is overwhelming"))
        .await
        .unwrap();
    controller
        .handle(ChatRequest::new("my manager keeps adding tasks").with_session_id(&first.session_id))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(messages[1]["content"], "work is overwhelming");
    assert_eq!(messages[2]["content"], "I hear you. Tell me more?");
    assert_eq!(messages[3]["content"], "my manager keeps adding tasks");

    let session = store.load(&first.session_id).await.unwrap().unwrap();
    assert_eq!(session.messages.len(), 4);
    assert_eq!(session.messages[3].role, Role::Therapist);
    let summaries = store.list().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_count, 4);
}

#[tokio::test]
async fn null_content_is_empty_completion_and_nothing_is_saved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_openai_response(None)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let controller = SessionController::stateful(
        CompletionGateway::new(provider(&server), DEFAULT_MODEL),
        Arc::new(FileTranscriptStore::new(dir.path())),
    );

    let err = controller
        .handle(ChatRequest::new("hello"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChatError::Upstream(GatewayError::EmptyCompletion)
    ));
    assert!(controller.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_error_status_surfaces_as_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"type": "rate_limit_error", "message": "slow down"}
        })))
        .mount(&server)
        .await;

    let gateway = CompletionGateway::new(provider(&server), DEFAULT_MODEL);
    let err = gateway.complete(&[], "hello").await.unwrap_err();
    assert!(matches!(err, GatewayError::Provider(_)));
    let text = err.to_string();
    assert!(text.contains("rate_limit"), "unexpected error: {text}");
    assert!(text.contains("slow down"));
}

#[tokio::test]
async fn off_schema_reply_is_invalid_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(mock_openai_response(Some("Just plain prose, no JSON."))),
        )
        .mount(&server)
        .await;

    let gateway = CompletionGateway::new(provider(&server), DEFAULT_MODEL);
    let err = gateway.complete(&[], "hello").await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidCompletion(_)));
}
