//! OpenAI chat-completions provider with JSON Schema structured output.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use notegraph_core::{
    Error, GenerationBackend, Result, StructuredGenerationBackend, StructuredRequest,
};

use super::types::*;
use crate::config::RemoteConfig;
use crate::error::{to_notegraph_error, ProviderErrorCode};

/// Provider label reported in lane results.
pub const PROVIDER_NAME: &str = "openai";

/// OpenAI-compatible provider.
pub struct OpenAIBackend {
    client: Client,
    config: RemoteConfig,
    api_key: String,
}

impl OpenAIBackend {
    /// Create a provider from configuration and a credential.
    pub fn new(config: RemoteConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing OpenAI backend: url={}, model={}",
            config.base_url, config.model
        );

        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Build a request with bearer authentication.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    /// Send a chat completion and return the first choice's text.
    async fn chat(
        &self,
        request: &ChatCompletionRequest,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let mut builder = self.build_request("/chat/completions").json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("OpenAI request timed out: {}", e))
            } else {
                Error::Request(format!("OpenAI request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<OpenAIErrorResponse> = response.json().await.ok();
            let (message, error_type) = match body {
                Some(body) => (
                    body.error.message,
                    body.error.error_type.unwrap_or_default(),
                ),
                None => ("Unknown error".to_string(), String::new()),
            };
            let code = ProviderErrorCode::from_response(status.as_u16(), &error_type);
            warn!(
                provider = PROVIDER_NAME,
                status = status.as_u16(),
                retryable = code.is_retryable(),
                "OpenAI returned an error"
            );
            return Err(to_notegraph_error(
                PROVIDER_NAME,
                code,
                &format!("{} {}", status, message),
            ));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(refusal) = result.refusal() {
            return Err(Error::Inference(format!("OpenAI refused: {}", refusal)));
        }

        let content = result
            .first_text()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::Inference("OpenAI response had no content".to_string()))?;

        debug!(response_len = content.len(), "OpenAI generation complete");
        Ok(content)
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    #[instrument(skip(self, system, prompt), fields(provider = PROVIDER_NAME, model = %self.config.model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: ChatMessage::conversation(system, prompt),
            temperature: None,
            max_tokens: Some(self.config.max_tokens),
            response_format: None,
            stream: false,
        };
        self.chat(&request, None).await
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl StructuredGenerationBackend for OpenAIBackend {
    #[instrument(skip(self, request), fields(provider = PROVIDER_NAME, model = %self.config.model, schema = %request.schema_name))]
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<Value> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: ChatMessage::conversation(&request.system, &request.prompt),
            temperature: None,
            max_tokens: Some(request.max_tokens),
            response_format: Some(ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: request.schema_name.clone(),
                    schema: request.schema.clone(),
                    strict: true,
                },
            }),
            stream: false,
        };

        let content = self.chat(&body, Some(request.timeout)).await?;
        serde_json::from_str(&content)
            .map_err(|e| Error::parse(format!("OpenAI structured output is not JSON: {}", e), &content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_reports_identity() {
        let backend = OpenAIBackend::new(RemoteConfig::openai_default(), "sk-test").unwrap();
        assert_eq!(backend.provider_name(), "openai");
        assert_eq!(backend.model_name(), "gpt-4o-mini");
        assert!(backend.runtime_details().is_none());
    }

    #[test]
    fn test_config_accessor() {
        let mut config = RemoteConfig::openai_default();
        config.base_url = "http://localhost:8080/v1/".to_string();
        let backend = OpenAIBackend::new(config, "k").unwrap();
        assert_eq!(backend.config().base_url, "http://localhost:8080/v1/");
    }
}
