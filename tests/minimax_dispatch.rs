//! MiniMax dispatch: XML tool-call framing over the OpenAI-compatible wire.

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agentflow_llm::core::types::config::ProviderSettings;
use agentflow_llm::{
    ChatMessage, ChatRequest, FinishReason, LlmProvider, MiniMaxProvider, RequestContext,
    extract_xml_tool_calls,
};

fn provider_for(server: &MockServer) -> MiniMaxProvider {
    let mut settings = ProviderSettings::new("minimax");
    settings.base_url = Some(server.uri());
    settings.api_key = Some("sk-test".to_string());
    MiniMaxProvider::new(settings).unwrap()
}

fn chat_request() -> ChatRequest {
    ChatRequest::new("abab6.5s-chat", vec![ChatMessage::user("weather?")])
}

#[tokio::test]
async fn xml_block_in_content_becomes_tool_calls() {
    let server = MockServer::start().await;
    let content =
        "Checking.\n<tool_calls>\n{\"name\": \"get_weather\", \"arguments\": {\"city\": \"Berlin\"}}\n</tool_calls>";
    Mock::given(method("POST"))
        .and(path("/v1/text/chatcompletion_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "mm-1",
            "model": "abab6.5s-chat",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    assert!(!provider.supports_native_function_calling());

    let response = provider
        .chat_completion(chat_request(), RequestContext::new())
        .await
        .unwrap();

    let choice = &response.choices[0];
    assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(choice.message.content.as_text(), "Checking.");
    let calls = choice.message.tool_calls.as_ref().unwrap();
    assert_eq!(calls[0].name, "get_weather");
    assert_eq!(calls[0].arguments, json!({"city": "Berlin"}));
}

#[tokio::test]
async fn malformed_xml_block_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text/chatcompletion_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "mm-1",
            "model": "abab6.5s-chat",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "<tool_calls>\nbroken"},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let err = provider
        .chat_completion(chat_request(), RequestContext::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn streamed_content_is_parsed_after_accumulation() {
    // the XML frame spans chunk boundaries; only the accumulated text can
    // be parsed, which is the consumer's job
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"id\":\"mm\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"<tool_calls>\\n{\\\"name\\\": \\\"f\\\",\"}}]}\n\n",
        "data: {\"id\":\"mm\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" \\\"arguments\\\": {\\\"x\\\": 1}}\\n</tool_calls>\"}}]}\n\n",
        "data: {\"id\":\"mm\",\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/text/chatcompletion_v2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let mut stream = provider
        .chat_completion_stream(chat_request(), RequestContext::new())
        .await
        .unwrap();

    let mut accumulated = String::new();
    while let Some(chunk) = stream.next().await {
        assert!(chunk.error.is_none());
        if let Some(content) = chunk.content() {
            accumulated.push_str(content);
        }
    }

    let (cleaned, calls) = extract_xml_tool_calls("minimax", &accumulated)
        .unwrap()
        .unwrap();
    assert!(cleaned.is_empty());
    assert_eq!(calls[0].name, "f");
    assert_eq!(calls[0].arguments, json!({"x": 1}));
}
