//! Bounded attempt tables for each lane kind.
//!
//! A lane walks its table in order and stops at the first success. There is
//! no implicit retry: every attempt a lane may make is listed here.

use std::fmt;
use std::future::Future;

use notegraph_core::Extraction;
use notegraph_extract::{build_recovery_prompt, build_user_prompt};

/// One way of asking a model for an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Schema-constrained generation.
    Structured,
    /// Plain generation with the user prompt.
    Freeform,
    /// Plain generation with the recovery directive appended.
    FreeformRecovery,
}

impl Attempt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Freeform => "freeform",
            Self::FreeformRecovery => "freeform-recovery",
        }
    }

    /// User prompt for this attempt.
    pub fn prompt(&self, text: &str) -> String {
        match self {
            Self::Structured | Self::Freeform => build_user_prompt(text),
            Self::FreeformRecovery => build_recovery_prompt(text),
        }
    }

    /// Whether a validated extraction is good enough to end the lane.
    ///
    /// Structured output without facts falls through to recovery; the other
    /// attempts accept anything with facts or entities.
    pub fn accept(&self, extraction: &Extraction) -> Result<(), String> {
        match self {
            Self::Structured if extraction.facts.is_empty() => {
                Err("structured output contained no facts".to_string())
            }
            Self::Freeform | Self::FreeformRecovery
                if extraction.facts.is_empty() && extraction.entities.is_empty() =>
            {
                Err("model returned no facts or entities".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local lane gets one freeform attempt.
pub const LOCAL_POLICY: &[Attempt] = &[Attempt::Freeform];

/// Remote lanes try structured output, then freeform with the recovery directive.
pub const REMOTE_POLICY: &[Attempt] = &[Attempt::Structured, Attempt::FreeformRecovery];

/// A failed attempt, kept for the lane message and the debug bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub attempt: Attempt,
    pub message: String,
    pub prompt: String,
    /// Raw model output when the model answered at all.
    pub raw: Option<String>,
}

/// Result of walking a policy table.
#[derive(Debug)]
pub struct PolicyOutcome<T> {
    /// The attempt that succeeded and its value.
    pub success: Option<(Attempt, T)>,
    /// Failures in attempt order.
    pub failures: Vec<AttemptFailure>,
}

impl<T> PolicyOutcome<T> {
    /// Whether an attempt after the first one ran.
    pub fn fallback_used(&self) -> bool {
        self.failures.len() + usize::from(self.success.is_some()) > 1
    }

    /// Every failure message, in order, joined into one line.
    pub fn failure_message(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.attempt, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Run `policy` in order until an attempt succeeds.
pub async fn run_policy<T, F, Fut>(policy: &[Attempt], mut run: F) -> PolicyOutcome<T>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, AttemptFailure>>,
{
    let mut failures = Vec::new();
    for &attempt in policy {
        match run(attempt).await {
            Ok(value) => {
                return PolicyOutcome {
                    success: Some((attempt, value)),
                    failures,
                }
            }
            Err(failure) => failures.push(failure),
        }
    }
    PolicyOutcome {
        success: None,
        failures,
    }
}
