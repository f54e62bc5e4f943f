//! Completion requests against a running llama.cpp server.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use notegraph_core::{Error, Result};

use crate::openai::types::{ChatCompletionRequest, ChatMessage, ResponseFormat};

/// Body for the plain `/completion` endpoint.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    stream: bool,
}

/// Generated text from either response envelope: a top-level `content`, or
/// `choices[0].text` / `choices[0].message.content` (string or parts array).
pub fn extract_completion_text(value: &Value) -> Option<String> {
    let text = if let Some(content) = value.get("content").and_then(Value::as_str) {
        content.to_string()
    } else {
        let choice = value.get("choices")?.get(0)?;
        if let Some(text) = choice.get("text").and_then(Value::as_str) {
            text.to_string()
        } else {
            match choice.get("message")?.get("content")? {
                Value::String(text) => text.clone(),
                Value::Array(parts) => parts
                    .iter()
                    .filter_map(|part| match part {
                        Value::String(text) => Some(text.as_str()),
                        other => other.get("text").and_then(Value::as_str),
                    })
                    .collect(),
                _ => return None,
            }
        }
    };
    (!text.trim().is_empty()).then_some(text)
}

/// HTTP client for one local server.
#[derive(Debug, Clone)]
pub struct LocalCompletionClient {
    http: reqwest::Client,
    model: String,
    n_predict: u32,
    temperature: f32,
}

impl LocalCompletionClient {
    pub fn new(http: reqwest::Client, model: String, n_predict: u32, temperature: f32) -> Self {
        Self {
            http,
            model,
            n_predict,
            temperature,
        }
    }

    /// Chat endpoint first; plain completion when chat errors or returns no text.
    pub async fn complete(&self, base_url: &str, system: &str, prompt: &str) -> Result<String> {
        match self.chat(base_url, system, prompt).await {
            Ok(text) => Ok(text),
            Err(chat_err) => {
                warn!(error = %chat_err, "Chat endpoint failed, falling back to /completion");
                self.completion(base_url, system, prompt)
                    .await
                    .map_err(|e| {
                        Error::Inference(format!("chat: {}; completion: {}", chat_err, e))
                    })
            }
        }
    }

    async fn chat(&self, base_url: &str, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: ChatMessage::conversation(system, prompt),
            temperature: Some(self.temperature),
            max_tokens: Some(self.n_predict),
            response_format: Some(ResponseFormat::JsonObject),
            stream: false,
        };
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        let value = self.post(&url, &request).await?;
        extract_completion_text(&value)
            .ok_or_else(|| Error::Inference("chat response carried no text".to_string()))
    }

    async fn completion(&self, base_url: &str, system: &str, prompt: &str) -> Result<String> {
        let joined = if system.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", system, prompt)
        };
        let request = CompletionRequest {
            prompt: &joined,
            n_predict: self.n_predict,
            temperature: self.temperature,
            stream: false,
        };
        let url = format!("{}/completion", base_url.trim_end_matches('/'));
        let value = self.post(&url, &request).await?;
        extract_completion_text(&value)
            .ok_or_else(|| Error::Inference("completion response carried no text".to_string()))
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Request(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "{} returned {}: {}",
                url,
                status,
                notegraph_core::error::excerpt(&body, 200)
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("{} returned invalid JSON: {}", url, e)))?;
        debug!(url, "Local completion response received");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_direct_content() {
        assert_eq!(
            extract_completion_text(&json!({"content": "{\"a\":1}", "stop": true})).as_deref(),
            Some("{\"a\":1}")
        );
    }

    #[test]
    fn test_extract_choice_text() {
        assert_eq!(
            extract_completion_text(&json!({"choices": [{"text": "hello"}]})).as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_extract_message_content_string() {
        let value = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(extract_completion_text(&value).as_deref(), Some("hi"));
    }

    #[test]
    fn test_extract_message_content_parts() {
        let value = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "a"},
            "b",
            {"type": "text", "text": "c"}
        ]}}]});
        assert_eq!(extract_completion_text(&value).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_rejects_empty_and_unknown() {
        assert!(extract_completion_text(&json!({"content": "  "})).is_none());
        assert!(extract_completion_text(&json!({"choices": []})).is_none());
        assert!(extract_completion_text(&json!({"result": "x"})).is_none());
        assert!(extract_completion_text(&json!({"choices": [{"message": {"content": 5}}]})).is_none());
    }
}
