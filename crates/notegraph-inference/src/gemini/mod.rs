//! Gemini provider (`generateContent`, JSON-Schema constrained output).

mod backend;
pub mod types;

pub use backend::{GeminiBackend, PROVIDER_NAME};
