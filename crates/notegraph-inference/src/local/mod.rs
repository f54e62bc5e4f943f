//! Local llama.cpp runtime.
//!
//! - [`process`]: launching the server binary and capturing its output
//! - [`runtime`]: memoized startup, GPU→CPU fallback, health polling
//! - [`client`]: chat-then-completion requests
//! - `shutdown`: process-wide kill on SIGINT/SIGTERM

pub mod client;
pub mod process;
pub mod runtime;
mod shutdown;

pub use client::{extract_completion_text, LocalCompletionClient};
pub use process::{
    free_port, is_acceleration_failure, LaunchSpec, LlamaServerLauncher, OutputTail,
    ServerLauncher, ServerMode, ServerProcess, ACCELERATION_FAILURE_SIGNATURES,
};
pub use runtime::{LocalRuntime, LocalServer, PROVIDER_NAME};
pub use shutdown::kill_all;
