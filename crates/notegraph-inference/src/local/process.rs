//! Spawning the completion server and watching its output.

use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

use notegraph_core::defaults::LOCAL_OUTPUT_TAIL_BYTES;
use notegraph_core::{Error, Result};

/// Acceleration mode the server was started in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Gpu,
    Cpu,
}

impl ServerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output fragments that mean the GPU backend could not initialize.
///
/// Matched case-insensitively against server output and failure messages.
pub const ACCELERATION_FAILURE_SIGNATURES: &[&str] = &[
    "failed to initialize vulkan",
    "errordevicelost",
    "vk::devicelosterror",
    "ggml_metal_init: error",
    "failed to create command queue",
    "command queue creation failed",
    "cuda error",
    "failed to initialize cuda",
    "no cuda-capable device",
    "hip error",
    "failed to initialize backend",
    "backend initialization failed",
    "failed to initialize device",
];

/// Whether `output` carries a recognized acceleration-backend failure.
pub fn is_acceleration_failure(output: &str) -> bool {
    let lower = output.to_lowercase();
    ACCELERATION_FAILURE_SIGNATURES
        .iter()
        .any(|signature| lower.contains(signature))
}

/// Bounded tail of server output, shared with the reader tasks.
#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: Arc<Mutex<String>>,
    cap: usize,
}

impl OutputTail {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(String::new())),
            cap,
        }
    }

    /// Append one line, discarding the oldest bytes beyond the cap.
    pub fn push_line(&self, line: &str) {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        buf.push_str(line);
        buf.push('\n');
        if buf.len() > self.cap {
            let mut cut = buf.len() - self.cap;
            while !buf.is_char_boundary(cut) {
                cut += 1;
            }
            buf.drain(..cut);
        }
    }

    pub fn snapshot(&self) -> String {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy lines from `reader` into the tail until it closes.
    pub fn follow<R>(&self, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(line = %line, "local server output");
                tail.push_line(&line);
            }
        });
    }
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(LOCAL_OUTPUT_TAIL_BYTES)
    }
}

/// Everything needed to start one server instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub binary: String,
    pub model_path: String,
    pub host: String,
    pub port: u16,
    pub context_size: u32,
    pub threads: usize,
    pub mode: ServerMode,
    pub gpu_layers: u32,
}

impl LaunchSpec {
    /// Command-line arguments for llama.cpp's server.
    pub fn args(&self) -> Vec<String> {
        let gpu_layers = match self.mode {
            ServerMode::Gpu => self.gpu_layers,
            ServerMode::Cpu => 0,
        };
        vec![
            "-m".to_string(),
            self.model_path.clone(),
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "-c".to_string(),
            self.context_size.to_string(),
            "-t".to_string(),
            self.threads.to_string(),
            "-ngl".to_string(),
            gpu_layers.to_string(),
        ]
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// A started (not necessarily healthy) server.
#[derive(Debug)]
pub struct ServerProcess {
    base_url: String,
    child: Option<Child>,
    output: OutputTail,
}

impl ServerProcess {
    pub fn spawned(base_url: String, child: Child, output: OutputTail) -> Self {
        Self {
            base_url,
            child: Some(child),
            output,
        }
    }

    /// A server this process does not own, reachable at `base_url`.
    pub fn external(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            child: None,
            output: OutputTail::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn output(&self) -> &OutputTail {
        &self.output
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Exit status if the child has already exited.
    pub fn exit_status(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("unknown status ({})", e)),
        }
    }

    pub(crate) fn into_parts(self) -> (String, Option<Child>, OutputTail) {
        (self.base_url, self.child, self.output)
    }
}

/// Starts server processes. The runtime's seam for tests.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ServerProcess>;
}

/// Launches llama.cpp's `llama-server`.
#[derive(Debug, Clone)]
pub struct LlamaServerLauncher {
    pub output_tail_bytes: usize,
}

impl Default for LlamaServerLauncher {
    fn default() -> Self {
        Self {
            output_tail_bytes: LOCAL_OUTPUT_TAIL_BYTES,
        }
    }
}

#[async_trait]
impl ServerLauncher for LlamaServerLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ServerProcess> {
        let args = spec.args();
        debug!(binary = %spec.binary, args = ?args, "Spawning local server");

        let mut child = Command::new(&spec.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Runtime(format!("failed to spawn {}: {}", spec.binary, e)))?;

        let output = OutputTail::new(self.output_tail_bytes);
        if let Some(stdout) = child.stdout.take() {
            output.follow(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            output.follow(stderr);
        }

        Ok(ServerProcess::spawned(spec.base_url(), child, output))
    }
}

/// Reserve a free port by binding an ephemeral listener and releasing it.
pub async fn free_port(host: &str) -> Result<u16> {
    let listener = tokio::net::TcpListener::bind((host, 0)).await?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(mode: ServerMode) -> LaunchSpec {
        LaunchSpec {
            binary: "llama-server".to_string(),
            model_path: "/models/gemma.gguf".to_string(),
            host: "127.0.0.1".to_string(),
            port: 41234,
            context_size: 4096,
            threads: 6,
            mode,
            gpu_layers: 99,
        }
    }

    #[test]
    fn test_args_gpu_and_cpu() {
        let gpu = spec(ServerMode::Gpu).args();
        assert_eq!(
            gpu,
            vec![
                "-m", "/models/gemma.gguf", "--host", "127.0.0.1", "--port", "41234", "-c",
                "4096", "-t", "6", "-ngl", "99"
            ]
        );
        let cpu = spec(ServerMode::Cpu).args();
        assert_eq!(cpu.last().map(String::as_str), Some("0"));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(spec(ServerMode::Cpu).base_url(), "http://127.0.0.1:41234");
    }

    #[test]
    fn test_acceleration_signatures() {
        assert!(is_acceleration_failure(
            "ggml_vulkan: Failed to initialize Vulkan instance"
        ));
        assert!(is_acceleration_failure("ggml_metal_init: error: failed to create command queue"));
        assert!(is_acceleration_failure("CUDA error: out of memory"));
        assert!(!is_acceleration_failure("ggml_vulkan: Found 1 Vulkan devices"));
        assert!(!is_acceleration_failure("error: model file not found"));
    }

    #[test]
    fn test_output_tail_is_bounded() {
        let tail = OutputTail::new(16);
        tail.push_line("first line here");
        tail.push_line("second");
        let snapshot = tail.snapshot();
        assert!(snapshot.len() <= 16);
        assert!(snapshot.ends_with("second\n"));
    }

    #[test]
    fn test_output_tail_respects_char_boundaries() {
        let tail = OutputTail::new(5);
        tail.push_line("ėėėė");
        let snapshot = tail.snapshot();
        assert!(snapshot.len() <= 6);
        assert!(snapshot.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_free_port_is_bindable() {
        let port = free_port("127.0.0.1").await.unwrap();
        assert!(port > 0);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn test_missing_binary_is_runtime_error() {
        let mut s = spec(ServerMode::Cpu);
        s.binary = "/nonexistent/notegraph-llama-server".to_string();
        let err = LlamaServerLauncher::default().launch(&s).await.unwrap_err();
        assert!(matches!(err, Error::Runtime(ref m) if m.contains("failed to spawn")));
    }

    #[test]
    fn test_external_process_has_no_child() {
        let mut process = ServerProcess::external("http://127.0.0.1:1");
        assert!(process.pid().is_none());
        assert!(process.exit_status().is_none());
        assert_eq!(process.base_url(), "http://127.0.0.1:1");
    }
}
