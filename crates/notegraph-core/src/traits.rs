//! Core traits for notegraph inference abstractions.
//!
//! These traits define the seams the lane orchestrator talks through, so the
//! local runtime and the remote providers can be swapped for fakes in tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for free-form text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Provider label used in lane results ("llama.cpp", "openai", "gemini").
    fn provider_name(&self) -> &str;

    /// Get the model name being used.
    fn model_name(&self) -> &str;

    /// Runtime details for debug bundles. Remote providers have none.
    fn runtime_details(&self) -> Option<RuntimeDetails> {
        None
    }
}

/// Request for schema-constrained generation.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system: String,
    pub prompt: String,
    /// Name reported to providers that require one.
    pub schema_name: String,
    /// JSON Schema describing the exact output shape.
    pub schema: serde_json::Value,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Backend able to constrain its output to a JSON Schema.
#[async_trait]
pub trait StructuredGenerationBackend: GenerationBackend {
    /// Generate a JSON value that conforms to `request.schema`.
    async fn generate_structured(&self, request: &StructuredRequest)
        -> Result<serde_json::Value>;
}

/// Runtime facts a local backend reports after a completion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeDetails {
    pub model_path: Option<String>,
    pub server_mode: Option<String>,
    pub n_predict: Option<u32>,
}
