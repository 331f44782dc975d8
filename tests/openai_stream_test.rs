//! Streams completions from an OpenAI-compatible endpoint served by
//! `wiremock`, both through the provider directly and through a full
//! `ChatContext`.

use std::rc::Rc;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatdesk::core::completion::openai::OpenAiCompatibleProvider;
use chatdesk::core::completion::{
    CompletionClient, CompletionRequest, ModelCategory, ModelInfo, Provider,
};
use chatdesk::core::context::ChatContext;
use chatdesk::core::error::ChatError;
use chatdesk::core::session::UsageLimits;
use chatdesk::core::storage::{MemoryBlobStore, MemoryKeyValueStore};

fn sse_body(deltas: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for delta in deltas {
        let record = serde_json::json!({ "choices": [{ "delta": { "content": delta } }] });
        body.push_str(&format!("data: {record}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn models() -> Vec<ModelInfo> {
    vec![ModelInfo {
        id: "mini".into(),
        name: "Mini".into(),
        description: String::new(),
        max_tokens: 4096,
        category: ModelCategory::Standard,
    }]
}

fn provider(server: &MockServer) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new("local", format!("{}/v1/", server.uri()), "sk-test", models())
}

fn request(message: &str) -> CompletionRequest {
    CompletionRequest {
        model: "mini".into(),
        message: message.into(),
        history: Vec::new(),
        system_prompt: None,
        temperature: None,
        max_tokens: None,
        web_search: false,
        reasoning_effort: None,
        cancel_token: CancellationToken::new(),
    }
}

#[tokio::test]
async fn streams_cumulative_text_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_string_contains("\"stream\":true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Hel", "lo", "!"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut seen = Vec::new();
    let response = provider(&server)
        .complete(request("hi"), &mut |text: &str| seen.push(text.to_string()))
        .await
        .unwrap();

    assert_eq!(response.text, "Hello!");
    assert_eq!(response.provider, "local");
    assert_eq!(seen, ["Hel", "Hello", "Hello!"]);
    server.verify().await;
}

#[tokio::test]
async fn error_status_surfaces_as_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string(
            r#"{"error":{"message":"slow down"}}"#,
        ))
        .mount(&server)
        .await;

    let err = provider(&server)
        .complete(request("hi"), &mut |_: &str| {})
        .await
        .unwrap_err();
    match err {
        ChatError::Provider { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("slow down"));
        }
        other => panic!("expected a provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let server = MockServer::start().await;
    let mut body = b"data: {not json}\n\n: keep-alive\n\n".to_vec();
    body.extend(sse_body(&["ok"]));
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let response = provider(&server)
        .complete(request("hi"), &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(response.text, "ok");
}

#[tokio::test]
async fn chat_context_round_trip_persists_the_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"content\":\"Hi\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Hello", " there"]), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let storage = Rc::new(MemoryKeyValueStore::new());
    let mut client = CompletionClient::new(storage.clone());
    client.register_provider(Box::new(provider(&server)));
    let mut ctx = ChatContext::new(
        storage,
        Rc::new(MemoryBlobStore::new()),
        client,
        UsageLimits::default(),
    );
    ctx.select_model("local", "mini", None).unwrap();

    let mut last = String::new();
    let response = ctx
        .send("Hi".into(), None, &mut |text: &str| last = text.to_string())
        .await
        .unwrap();

    assert_eq!(response.text, "Hello there");
    assert_eq!(last, "Hello there");
    let conversation = ctx.session().active_conversation().unwrap();
    assert_eq!(conversation.title, "Hi");
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(ctx.session().usage().standard_count, 1);
}
