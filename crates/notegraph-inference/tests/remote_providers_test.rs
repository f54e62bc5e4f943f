//! Remote providers against mock HTTP servers.

use std::time::Duration;

use notegraph_core::{Error, GenerationBackend, StructuredGenerationBackend, StructuredRequest};
use notegraph_inference::{GeminiBackend, OpenAIBackend, RemoteConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote(base_url: String, model: &str) -> RemoteConfig {
    RemoteConfig {
        base_url,
        model: model.to_string(),
        timeout_secs: 10,
        max_tokens: 512,
    }
}

fn structured_request(timeout: Duration) -> StructuredRequest {
    StructuredRequest {
        system: "extract".to_string(),
        prompt: "I called support.".to_string(),
        schema_name: "note_extraction".to_string(),
        schema: json!({"type": "object", "properties": {"facts": {"type": "array"}}}),
        max_tokens: 256,
        timeout,
    }
}

#[tokio::test]
async fn test_openai_structured_sends_strict_schema() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "max_tokens": 256,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "note_extraction", "strict": true}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"facts\": []}"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = OpenAIBackend::new(remote(mock_server.uri(), "gpt-test"), "sk-test").unwrap();
    let value = backend
        .generate_structured(&structured_request(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(value, json!({"facts": []}));
}

#[tokio::test]
async fn test_openai_freeform_returns_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "note"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Sure: {\"facts\": []}"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = OpenAIBackend::new(remote(mock_server.uri(), "gpt-test"), "k").unwrap();
    let text = backend.generate_with_system("sys", "note").await.unwrap();
    assert_eq!(text, "Sure: {\"facts\": []}");
}

#[tokio::test]
async fn test_openai_error_status_mapped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key", "type": "invalid_request_error"}
        })))
        .mount(&mock_server)
        .await;

    let backend = OpenAIBackend::new(remote(mock_server.uri(), "gpt-test"), "bad").unwrap();
    let err = backend.generate_with_system("", "note").await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("Incorrect API key"));
}

#[tokio::test]
async fn test_openai_non_json_structured_output_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "{\"facts\": ["}}]
        })))
        .mount(&mock_server)
        .await;

    let backend = OpenAIBackend::new(remote(mock_server.uri(), "gpt-test"), "k").unwrap();
    let err = backend
        .generate_structured(&structured_request(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
}

#[tokio::test]
async fn test_openai_request_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "{}"}}]}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let backend = OpenAIBackend::new(remote(mock_server.uri(), "gpt-test"), "k").unwrap();
    let err = backend
        .generate_structured(&structured_request(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_gemini_structured_sends_json_schema() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "extract"}]},
            "contents": [{"role": "user", "parts": [{"text": "I called support."}]}],
            "generationConfig": {
                "responseMimeType": "application/json",
                "maxOutputTokens": 256,
                "responseJsonSchema": {"type": "object"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"facts\":"}, {"text": " []}"}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = GeminiBackend::new(remote(mock_server.uri(), "gemini-test"), "g-key").unwrap();
    let value = backend
        .generate_structured(&structured_request(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(value, json!({"facts": []}));
}

#[tokio::test]
async fn test_gemini_freeform_without_schema() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "```json\n{}\n```"}]}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = GeminiBackend::new(remote(mock_server.uri(), "gemini-test"), "g").unwrap();
    let text = backend.generate_with_system("sys", "note").await.unwrap();
    assert_eq!(text, "```json\n{}\n```");

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["generationConfig"].get("responseJsonSchema").is_none());
}

#[tokio::test]
async fn test_gemini_blocked_prompt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&mock_server)
        .await;

    let backend = GeminiBackend::new(remote(mock_server.uri(), "gemini-test"), "g").unwrap();
    let err = backend.generate_with_system("", "note").await.unwrap_err();
    assert!(err.to_string().contains("SAFETY"));
}

#[tokio::test]
async fn test_gemini_error_status_mapped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&mock_server)
        .await;

    let backend = GeminiBackend::new(remote(mock_server.uri(), "gemini-test"), "g").unwrap();
    let err = backend
        .generate_structured(&structured_request(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(ref m) if m.contains("rate limit") && m.contains("Quota exceeded")));
}
