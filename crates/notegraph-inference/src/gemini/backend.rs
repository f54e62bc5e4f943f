//! Gemini `generateContent` provider.

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
pub const PROVIDER_NAME: &str = "gemini";

const JSON_MIME: &str = "application/json";

/// Gemini provider.
pub struct GeminiBackend {
    client: Client,
    config: RemoteConfig,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: RemoteConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing Gemini backend: url={}, model={}",
            config.base_url, config.model
        );

        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(
        system: &str,
        prompt: &str,
        generation_config: GenerationConfig,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: (!system.is_empty()).then(|| Content::text(None, system)),
            contents: vec![Content::text(Some("user"), prompt)],
            generation_config,
        }
    }

    async fn generate(
        &self,
        body: &GenerateContentRequest,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("Gemini request timed out: {}", e))
            } else {
                Error::Request(format!("Gemini request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<GeminiErrorResponse> = response.json().await.ok();
            let (message, error_status) = match body {
                Some(body) => (body.error.message, body.error.status.unwrap_or_default()),
                None => ("Unknown error".to_string(), String::new()),
            };
            let code = ProviderErrorCode::from_response(status.as_u16(), &error_status);
            warn!(
                provider = PROVIDER_NAME,
                status = status.as_u16(),
                retryable = code.is_retryable(),
                "Gemini returned an error"
            );
            return Err(to_notegraph_error(
                PROVIDER_NAME,
                code,
                &format!("{} {}", status, message),
            ));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(reason) = result.block_reason() {
            return Err(Error::Inference(format!("Gemini blocked the response: {}", reason)));
        }

        let content = result
            .first_text()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::Inference("Gemini response had no text".to_string()))?;

        debug!(response_len = content.len(), "Gemini generation complete");
        Ok(content)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    #[instrument(skip(self, system, prompt), fields(provider = PROVIDER_NAME, model = %self.config.model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let body = Self::request_body(
            system,
            prompt,
            GenerationConfig {
                max_output_tokens: Some(self.config.max_tokens),
                ..GenerationConfig::default()
            },
        );
        self.generate(&body, None).await
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl StructuredGenerationBackend for GeminiBackend {
    #[instrument(skip(self, request), fields(provider = PROVIDER_NAME, model = %self.config.model, schema = %request.schema_name))]
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<Value> {
        let body = Self::request_body(
            &request.system,
            &request.prompt,
            GenerationConfig {
                max_output_tokens: Some(request.max_tokens),
                temperature: None,
                response_mime_type: Some(JSON_MIME.to_string()),
                response_json_schema: Some(request.schema.clone()),
            },
        );

        let content = self.generate(&body, Some(request.timeout)).await?;
        serde_json::from_str(&content)
            .map_err(|e| Error::parse(format!("Gemini structured output is not JSON: {}", e), &content))
    }
}
