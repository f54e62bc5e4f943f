//! # notegraph-inference
//!
//! Model backends for notegraph.
//!
//! - [`local`]: a llama.cpp server owned by the process, started lazily and
//!   shared by every caller
//! - [`openai`] and [`gemini`]: remote providers with JSON-Schema structured output
//! - [`config`]: TOML / environment configuration for all three

pub mod config;
pub mod error;
pub mod gemini;
pub mod local;
pub mod openai;

pub use config::{ConfigError, LocalConfig, NotegraphConfig, RemoteConfig};
pub use error::{to_notegraph_error, ProviderErrorCode};
pub use gemini::GeminiBackend;
pub use local::{LocalRuntime, ServerLauncher, ServerMode};
pub use openai::OpenAIBackend;
