//! OpenAI provider.
//!
//! Plain generation goes through `/chat/completions`; structured generation adds
//! a strict `json_schema` response format so the answer is already a JSON object.
//!
//! # Example
//!
//! ```rust,no_run
//! use notegraph_inference::config::RemoteConfig;
//! use notegraph_inference::openai::OpenAIBackend;
//!
//! let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
//! let backend = OpenAIBackend::new(RemoteConfig::openai_default(), key).unwrap();
//! ```

mod backend;
pub mod types;

pub use backend::{OpenAIBackend, PROVIDER_NAME};
