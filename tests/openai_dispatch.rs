//! End-to-end dispatch tests for the OpenAI-compatible family, driven
//! against a local mock upstream.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agentflow_llm::core::types::config::ProviderSettings;
use agentflow_llm::core::providers::profile;
use agentflow_llm::{
    ChatMessage, ChatRequest, FinishReason, LlmProvider, OpenAiCompatProvider, ProviderError,
    RequestContext, ToolCallAccumulator,
};

fn provider_for(server: &MockServer) -> OpenAiCompatProvider {
    let mut settings = ProviderSettings::new("openai");
    settings.base_url = Some(server.uri());
    settings.api_key = Some("sk-test".to_string());
    OpenAiCompatProvider::new(&profile::OPENAI, settings).unwrap()
}

fn chat_request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user("hi")])
}

fn unary_reply() -> serde_json::Value {
    json!({
        "id": "resp-1",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hello"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
    })
}

async fn mount_unary(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(unary_reply()))
        .mount(server)
        .await;
}

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

#[tokio::test]
async fn sends_bearer_auth_and_json_content_type() {
    let server = MockServer::start().await;
    mount_unary(&server).await;

    let provider = provider_for(&server);
    provider
        .chat_completion(chat_request("gpt-4o-mini"), RequestContext::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer sk-test"
    );
    assert!(
        request
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
}

#[tokio::test]
async fn context_key_override_wins_per_call() {
    let server = MockServer::start().await;
    mount_unary(&server).await;

    let provider = provider_for(&server);
    let context = RequestContext::new().with_api_key_override("  sk-override  ");
    provider
        .chat_completion(chat_request("gpt-4o-mini"), context)
        .await
        .unwrap();
    // the next call without an override falls back to the configured key
    provider
        .chat_completion(chat_request("gpt-4o-mini"), RequestContext::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = |i: usize| {
        requests[i]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    };
    assert_eq!(auth(0), "Bearer sk-override");
    assert_eq!(auth(1), "Bearer sk-test");
}

#[tokio::test]
async fn empty_model_resolves_to_configured_default() {
    let server = MockServer::start().await;
    mount_unary(&server).await;

    let mut settings = ProviderSettings::new("openai");
    settings.base_url = Some(server.uri());
    settings.api_key = Some("sk-test".to_string());
    settings.default_model = Some("m-x".to_string());
    let provider = OpenAiCompatProvider::new(&profile::OPENAI, settings).unwrap();

    provider
        .chat_completion(chat_request(""), RequestContext::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "m-x");
}

#[tokio::test]
async fn empty_model_without_default_uses_vendor_fallback() {
    let server = MockServer::start().await;
    mount_unary(&server).await;

    let provider = provider_for(&server);
    provider
        .chat_completion(chat_request(""), RequestContext::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
}

#[tokio::test]
async fn unary_body_never_sets_stream_and_stream_body_always_does() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(unary_reply()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response("data: [DONE]\n\n"))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    provider
        .chat_completion(chat_request("gpt-4o-mini"), RequestContext::new())
        .await
        .unwrap();
    let mut stream = provider
        .chat_completion_stream(chat_request("gpt-4o-mini"), RequestContext::new())
        .await
        .unwrap();
    while stream.next().await.is_some() {}

    let requests = server.received_requests().await.unwrap();
    let body = |i: usize| -> serde_json::Value {
        serde_json::from_slice(&requests[i].body).unwrap()
    };
    assert!(body(0).get("stream").is_none());
    assert_eq!(body(1)["stream"], json!(true));
}

#[tokio::test]
async fn stream_emits_one_chunk_per_data_line_then_closes() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request("m"), RequestContext::new())
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.id, "a");
    assert_eq!(first.content(), Some("Hel"));
    assert!(first.error.is_none());

    let second = stream.next().await.unwrap();
    assert_eq!(second.content(), Some("lo"));
    assert!(second.error.is_none());

    assert!(stream.next().await.is_none(), "channel must close after [DONE]");
}

#[tokio::test]
async fn data_after_done_is_ignored() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"id\":\"b\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ghost\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request("m"), RequestContext::new())
        .await
        .unwrap();

    let mut contents = Vec::new();
    while let Some(chunk) = stream.next().await {
        assert!(chunk.error.is_none());
        if let Some(content) = chunk.content() {
            contents.push(content.to_string());
        }
    }
    assert_eq!(contents, vec!["x"]);
}

#[tokio::test]
async fn invalid_json_line_terminates_with_upstream_error() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ok\"}}]}\n\n",
        "data: {not json\n\n",
        "data: {\"id\":\"c\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"never\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request("m"), RequestContext::new())
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.content(), Some("ok"));

    let terminal = stream.next().await.unwrap();
    let err = terminal.error.as_ref().expect("terminal chunk carries the error");
    assert!(matches!(err, ProviderError::Upstream { status: 502, .. }));
    assert!(err.is_retryable());
    assert_eq!(err.provider(), "openai");

    assert!(stream.next().await.is_none(), "channel must close after the error");
}

#[tokio::test]
async fn eof_without_done_surfaces_upstream_error() {
    let server = MockServer::start().await;
    let sse =
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request("m"), RequestContext::new())
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().content(), Some("x"));
    let terminal = stream.next().await.unwrap();
    assert!(matches!(
        terminal.error,
        Some(ProviderError::Upstream { .. })
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn http_error_status_becomes_single_error_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "9")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request("m"), RequestContext::new())
        .await
        .unwrap();

    let terminal = stream.next().await.unwrap();
    match terminal.error {
        Some(ProviderError::RateLimited { retry_after, .. }) => {
            assert_eq!(retry_after, Some(9));
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn unary_status_mapping_and_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = provider
        .chat_completion(chat_request("m"), RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::AuthFailed { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn tool_call_fragments_accumulate_to_valid_json() {
    // OpenAI string-wrapped fragments: {"a":  +  "1",  +  "b":2}
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"f\",\"arguments\":\"{\\\"a\\\":\"}}]}}]}\n\n",
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"1\\\",\"}}]}}]}\n\n",
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"b\\\":2}\"}}]}}]}\n\n",
        "data: {\"id\":\"a\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse_response(sse))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request("m"), RequestContext::new())
        .await
        .unwrap();

    let mut accumulator = ToolCallAccumulator::new("openai");
    let mut finish = None;
    while let Some(chunk) = stream.next().await {
        assert!(chunk.error.is_none());
        accumulator.push_chunk(&chunk);
        if let Some(reason) = chunk.choices.first().and_then(|c| c.finish_reason) {
            finish = Some(reason);
        }
    }

    assert_eq!(finish, Some(FinishReason::ToolCalls));
    let calls = accumulator.finish().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_1");
    assert_eq!(calls[0].name, "f");
    assert_eq!(calls[0].arguments, json!({"a": "1", "b": 2}));
}

#[tokio::test]
async fn cancellation_aborts_inflight_request_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(unary_reply())
                .set_delay(Duration::from_secs(20)),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let context = RequestContext::new();
    let cancel_handle = context.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_handle.cancel();
    });

    let started = std::time::Instant::now();
    let err = provider
        .chat_completion(chat_request("m"), context)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Cancelled { .. }));
    assert!(!err.is_retryable());
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancellation took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn rewriter_rejection_fails_both_entry_points() {
    let server = MockServer::start().await;
    mount_unary(&server).await;

    let provider = provider_for(&server);
    let empty = ChatRequest::new("m", vec![]);

    let err = provider
        .chat_completion(empty.clone(), RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));
    assert_eq!(err.http_status(), 400);
    assert!(err.to_string().contains("request rewrite failed"));

    let err = match provider
        .chat_completion_stream(empty, RequestContext::new())
        .await
    {
        Ok(_) => panic!("expected chat_completion_stream to fail"),
        Err(err) => err,
    };
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));

    // nothing reached the wire
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_models_decodes_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "gpt-4o-mini", "created": 1},
                {"id": "gpt-4o", "created": 2}
            ]
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let models = provider.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].provider, "openai");

    let probe = provider.health_check().await;
    assert!(probe.healthy);
}
