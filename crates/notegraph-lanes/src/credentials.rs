//! Remote provider credentials, read only from the environment.

use notegraph_core::defaults::{GEMINI_KEY_VAR, OPENAI_KEY_VAR};

/// Per-provider API keys. A missing key makes its lane `skipped`.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub openai: Option<String>,
    pub gemini: Option<String>,
}

impl Credentials {
    /// Read `OPENAI_API_KEY` and `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            openai: read(OPENAI_KEY_VAR),
            gemini: read(GEMINI_KEY_VAR),
        }
    }
}

// Keys never reach logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai", &self.openai.as_ref().map(|_| "<set>"))
            .field("gemini", &self.gemini.as_ref().map(|_| "<set>"))
            .finish()
    }
}
