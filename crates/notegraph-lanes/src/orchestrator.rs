//! Runs one note through the local and remote lanes concurrently.
//!
//! Lanes share nothing: each builds its own prompt, request, and pipeline run,
//! and each ends in its own [`ExtractionLaneResult`]. A lane failure is data,
//! never an error returned from [`LaneOrchestrator::run`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, info_span, warn, Instrument};

use notegraph_core::{
    DebugBundle, ExtractionLaneResult, GenerationBackend, LaneId, LaneStatus, RawModelOutput,
    Result, StructuredGenerationBackend, StructuredRequest,
};
use notegraph_extract::{extraction_schema, run_pipeline, PipelineOutput, SCHEMA_NAME, SYSTEM_PROMPT};
use notegraph_inference::config::{NotegraphConfig, RemoteConfig};
use notegraph_inference::{gemini, openai, GeminiBackend, OpenAIBackend};

use crate::credentials::Credentials;
use crate::policy::{run_policy, Attempt, AttemptFailure, LOCAL_POLICY, REMOTE_POLICY};

/// A remote lane: a ready provider, or the reason it cannot run.
pub struct RemoteLane {
    provider: String,
    model: String,
    credential_var: &'static str,
    backend: Option<Arc<dyn StructuredGenerationBackend>>,
    max_tokens: u32,
    timeout: Duration,
}

impl RemoteLane {
    pub fn ready(
        backend: Arc<dyn StructuredGenerationBackend>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider: backend.provider_name().to_string(),
            model: backend.model_name().to_string(),
            credential_var: "",
            backend: Some(backend),
            max_tokens,
            timeout,
        }
    }

    /// A lane whose credential variable is unset; it reports `skipped`.
    pub fn missing_credential(provider: &str, model: &str, credential_var: &'static str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            credential_var,
            backend: None,
            max_tokens: 0,
            timeout: Duration::ZERO,
        }
    }

    fn from_config<B, F>(
        provider: &str,
        config: &RemoteConfig,
        credential: Option<&String>,
        credential_var: &'static str,
        build: F,
    ) -> Result<Self>
    where
        B: StructuredGenerationBackend + 'static,
        F: FnOnce(RemoteConfig, String) -> Result<B>,
    {
        match credential {
            Some(key) => {
                let backend = build(config.clone(), key.clone())?;
                Ok(Self::ready(Arc::new(backend), config.max_tokens, config.timeout()))
            }
            None => Ok(Self::missing_credential(provider, &config.model, credential_var)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }
}

/// What a lane talks to.
enum LaneBackend<'a> {
    Local(&'a dyn GenerationBackend),
    Remote {
        backend: &'a dyn StructuredGenerationBackend,
        max_tokens: u32,
        timeout: Duration,
    },
}

impl LaneBackend<'_> {
    async fn generate_text(&self, system: &str, prompt: &str) -> Result<String> {
        match self {
            Self::Local(backend) => backend.generate_with_system(system, prompt).await,
            Self::Remote { backend, .. } => backend.generate_with_system(system, prompt).await,
        }
    }

    fn runtime_details(&self) -> Option<notegraph_core::RuntimeDetails> {
        match self {
            Self::Local(backend) => backend.runtime_details(),
            Self::Remote { backend, .. } => backend.runtime_details(),
        }
    }
}

/// A successful attempt.
struct AttemptSuccess {
    prompt: String,
    raw: String,
    output: PipelineOutput,
}

/// Runs the lanes for a note.
pub struct LaneOrchestrator {
    local: Arc<dyn GenerationBackend>,
    openai: RemoteLane,
    gemini: RemoteLane,
}

impl LaneOrchestrator {
    /// The local backend's lifecycle stays with the caller.
    pub fn new(local: Arc<dyn GenerationBackend>, openai: RemoteLane, gemini: RemoteLane) -> Self {
        Self {
            local,
            openai,
            gemini,
        }
    }

    /// Build the remote lanes from configuration; absent credentials give skipped lanes.
    pub fn from_config(
        config: &NotegraphConfig,
        credentials: &Credentials,
        local: Arc<dyn GenerationBackend>,
    ) -> Result<Self> {
        let openai = RemoteLane::from_config(
            openai::PROVIDER_NAME,
            &config.openai,
            credentials.openai.as_ref(),
            notegraph_core::defaults::OPENAI_KEY_VAR,
            |config, key| OpenAIBackend::new(config, key),
        )?;
        let gemini = RemoteLane::from_config(
            gemini::PROVIDER_NAME,
            &config.gemini,
            credentials.gemini.as_ref(),
            notegraph_core::defaults::GEMINI_KEY_VAR,
            |config, key| GeminiBackend::new(config, key),
        )?;
        Ok(Self::new(local, openai, gemini))
    }

    /// Run every lane.
    pub async fn run_all(&self, text: &str) -> Vec<ExtractionLaneResult> {
        self.run(text, &LaneId::ALL).await
    }

    /// Run the selected lanes concurrently, one result per distinct lane, in the order given.
    pub async fn run(&self, text: &str, lanes: &[LaneId]) -> Vec<ExtractionLaneResult> {
        let mut selected: Vec<LaneId> = Vec::with_capacity(lanes.len());
        for lane in lanes {
            if !selected.contains(lane) {
                selected.push(*lane);
            }
        }
        join_all(selected.into_iter().map(|lane| self.run_lane(lane, text))).await
    }

    async fn run_lane(&self, lane: LaneId, text: &str) -> ExtractionLaneResult {
        let started = Instant::now();
        let mut bundle = DebugBundle::new(text, &Attempt::Freeform.prompt(text));
        let span = info_span!("lane", lane = %lane, run_id = %bundle.run_id);

        async move {
            let (provider, model, backend, policy) = match lane {
                LaneId::Local => (
                    self.local.provider_name().to_string(),
                    self.local.model_name().to_string(),
                    LaneBackend::Local(self.local.as_ref()),
                    LOCAL_POLICY,
                ),
                LaneId::OpenAi | LaneId::Gemini => {
                    let remote = if lane == LaneId::OpenAi {
                        &self.openai
                    } else {
                        &self.gemini
                    };
                    let Some(backend) = remote.backend.as_deref() else {
                        info!(provider = %remote.provider, "Credential {} not set, lane skipped", remote.credential_var);
                        return ExtractionLaneResult {
                            lane,
                            status: LaneStatus::Skipped,
                            provider: remote.provider.clone(),
                            model: Some(remote.model.clone()),
                            extraction: None,
                            debug: None,
                            message: Some(format!("{} is not set", remote.credential_var)),
                            duration_ms: started.elapsed().as_millis() as u64,
                        };
                    };
                    (
                        remote.provider.clone(),
                        remote.model.clone(),
                        LaneBackend::Remote {
                            backend,
                            max_tokens: remote.max_tokens,
                            timeout: remote.timeout,
                        },
                        REMOTE_POLICY,
                    )
                }
            };

            let lane_backend = &backend;
            let outcome = run_policy(policy, move |attempt| {
                self.run_attempt(lane_backend, attempt, text)
            })
            .await;

            for failure in &outcome.failures {
                warn!(attempt = %failure.attempt, error = %failure.message, "Lane attempt failed");
                bundle.errors.push(format!("{}: {}", failure.attempt, failure.message));
            }
            bundle.fallback_used = outcome.fallback_used();

            let details = backend.runtime_details().unwrap_or_default();
            bundle.runtime.model_path = details.model_path;
            bundle.runtime.server_mode = details.server_mode;
            bundle.runtime.n_predict = details.n_predict;

            let (status, extraction, message) = match outcome.success {
                Some((_, success)) => {
                    bundle.prompt = success.prompt;
                    bundle.raw_model_output = Some(success.raw);
                    bundle.validated_before_segmentation =
                        Some(success.output.validated_before_segmentation);
                    bundle.final_extraction = Some(success.output.extraction.clone());
                    bundle.segmentation_trace = success.output.segmentation_trace;
                    (LaneStatus::Ok, Some(success.output.extraction), None)
                }
                None => {
                    if let Some(last) = outcome.failures.last() {
                        bundle.prompt = last.prompt.clone();
                        bundle.raw_model_output = last.raw.clone();
                    }
                    (LaneStatus::Error, None, Some(outcome.failure_message()))
                }
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            bundle.runtime.total_ms = duration_ms;
            info!(
                provider = %provider,
                status = ?status,
                fallback_used = bundle.fallback_used,
                duration_ms,
                "Lane finished"
            );

            ExtractionLaneResult {
                lane,
                status,
                provider,
                model: Some(model),
                extraction,
                debug: Some(bundle),
                message,
                duration_ms,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_attempt(
        &self,
        backend: &LaneBackend<'_>,
        attempt: Attempt,
        text: &str,
    ) -> std::result::Result<AttemptSuccess, AttemptFailure> {
        let prompt = attempt.prompt(text);
        let fail = |message: String, raw: Option<String>| AttemptFailure {
            attempt,
            message,
            prompt: prompt.clone(),
            raw,
        };

        let raw = match (attempt, backend) {
            (
                Attempt::Structured,
                LaneBackend::Remote {
                    backend,
                    max_tokens,
                    timeout,
                },
            ) => {
                let request = StructuredRequest {
                    system: SYSTEM_PROMPT.to_string(),
                    prompt: prompt.clone(),
                    schema_name: SCHEMA_NAME.to_string(),
                    schema: extraction_schema(),
                    max_tokens: *max_tokens,
                    timeout: *timeout,
                };
                let value = backend
                    .generate_structured(&request)
                    .await
                    .map_err(|e| fail(e.to_string(), None))?;
                RawModelOutput::Object(value)
            }
            (Attempt::Structured, LaneBackend::Local(_)) => {
                return Err(fail(
                    "structured generation is not available on this lane".to_string(),
                    None,
                ))
            }
            (Attempt::Freeform | Attempt::FreeformRecovery, _) => {
                let answer = backend
                    .generate_text(SYSTEM_PROMPT, &prompt)
                    .await
                    .map_err(|e| fail(e.to_string(), None))?;
                RawModelOutput::Text(answer)
            }
        };

        let raw_text = raw.to_text();
        let output = run_pipeline(text, &raw).map_err(|e| fail(e.to_string(), Some(raw_text.clone())))?;
        attempt
            .accept(&output.extraction)
            .map_err(|message| fail(message, Some(raw_text.clone())))?;

        Ok(AttemptSuccess {
            prompt,
            raw: raw_text,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_lane_not_ready() {
        let lane = RemoteLane::missing_credential("openai", "gpt-4o-mini", "OPENAI_API_KEY");
        assert!(!lane.is_ready());
        assert_eq!(lane.credential_var, "OPENAI_API_KEY");
    }

    #[test]
    fn test_from_config_respects_credentials() {
        let config = NotegraphConfig::default();
        let lane = RemoteLane::from_config(
            "openai",
            &config.openai,
            None,
            "OPENAI_API_KEY",
            |config, key| OpenAIBackend::new(config, key),
        )
        .unwrap();
        assert!(!lane.is_ready());

        let key = "sk-test".to_string();
        let lane = RemoteLane::from_config(
            "gemini",
            &config.gemini,
            Some(&key),
            "GEMINI_API_KEY",
            |config, key| GeminiBackend::new(config, key),
        )
        .unwrap();
        assert!(lane.is_ready());
        assert_eq!(lane.provider, "gemini");
        assert_eq!(lane.model, "gemini-2.0-flash");
        assert_eq!(lane.max_tokens, notegraph_core::defaults::REMOTE_MAX_TOKENS);
    }
}
