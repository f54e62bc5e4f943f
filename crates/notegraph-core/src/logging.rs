//! Structured logging field name constants for notegraph.
//!
//! All crates use these constants for consistent structured logging fields.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (server start/stop), lane completions |
//! | DEBUG | Decision points, repairs, ownership remaps |
//! | TRACE | Per-item iteration (spans, clusters) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation id of one extraction run (UUIDv7).
pub const RUN_ID: &str = "run_id";

/// Lane the event belongs to ("local", "openai", "gemini").
pub const LANE: &str = "lane";

/// Provider handling the request.
pub const PROVIDER: &str = "provider";

/// Logical operation name.
/// Examples: "validate", "resolve_ownership", "segment", "complete"
pub const OPERATION: &str = "op";

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of evidence spans fed to segmentation.
pub const SPAN_COUNT: &str = "span_count";

/// Number of segments produced.
pub const SEGMENT_COUNT: &str = "segment_count";

/// Items dropped during validation or resolution.
pub const DROPPED: &str = "dropped";

/// Spans moved by grounding repair.
pub const REPAIRED: &str = "repaired";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Runtime fields ────────────────────────────────────────────────────────

/// Acceleration mode of the local server ("gpu", "cpu").
pub const SERVER_MODE: &str = "server_mode";

/// Local server port.
pub const PORT: &str = "port";

/// Attempt label inside a fallback chain.
pub const ATTEMPT: &str = "attempt";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
