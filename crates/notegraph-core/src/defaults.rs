//! Centralized default constants for notegraph.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the CLI reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// EXTRACTION SHAPE
// =============================================================================

/// Canonical id of the narrator ("self") entity after ownership resolution.
pub const SELF_ENTITY_ID: &str = "self";

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 25;

/// Characters of raw model output quoted in parse errors.
pub const RAW_EXCERPT_CHARS: usize = 200;

/// Confidence assigned to facts and todos synthesized from lexical cues.
pub const SYNTHESIZED_CONFIDENCE: f64 = 0.6;

// =============================================================================
// SEGMENTATION
// =============================================================================

/// Maximum gap in characters between evidence spans merged into one cluster.
///
/// Tuned for short first-person notes; not derived.
pub const SEGMENT_GAP_CHARS: usize = 80;

/// Characters of whitespace-collapsed segment text kept as the segment summary.
pub const SEGMENT_SUMMARY_CHARS: usize = 120;

// =============================================================================
// LOCAL RUNTIME
// =============================================================================

/// Default local completion server binary (llama.cpp server).
pub const LOCAL_SERVER_BINARY: &str = "llama-server";

/// Host the local server binds to.
pub const LOCAL_HOST: &str = "127.0.0.1";

/// Context window passed to the local server.
pub const LOCAL_CONTEXT_SIZE: u32 = 4096;

/// Tokens to predict per local completion.
pub const LOCAL_N_PREDICT: u32 = 1024;

/// Sampling temperature for local completions.
pub const LOCAL_TEMPERATURE: f32 = 0.1;

/// Cores left free when deriving the server thread count.
pub const LOCAL_THREAD_RESERVE: usize = 2;

/// GPU layers requested in accelerated mode.
pub const LOCAL_GPU_LAYERS: u32 = 99;

/// How long the local server may take to report healthy (first load is slow).
pub const LOCAL_STARTUP_TIMEOUT_SECS: u64 = 60;

/// Interval between liveness probes during startup.
pub const LOCAL_HEALTH_POLL_MS: u64 = 250;

/// Request-scoped completion timeout for the local server.
pub const LOCAL_REQUEST_TIMEOUT_SECS: u64 = 45;

/// Bytes of server output retained for failure diagnostics.
pub const LOCAL_OUTPUT_TAIL_BYTES: usize = 4096;

// =============================================================================
// REMOTE PROVIDERS
// =============================================================================

/// Default OpenAI API endpoint.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default OpenAI generation model.
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Credential variable for the OpenAI lane.
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// Default Gemini API endpoint.
pub const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini generation model.
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Credential variable for the Gemini lane.
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

/// Timeout for remote generation requests in seconds.
pub const REMOTE_TIMEOUT_SECS: u64 = 90;

/// Output token budget for remote generation.
pub const REMOTE_MAX_TOKENS: u32 = 4096;
