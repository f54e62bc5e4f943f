//! The local runtime: one lazily started, memoized completion server.
//!
//! The first caller of [`LocalRuntime::start`] launches the server; every
//! caller that arrives while startup is in flight awaits the same future. The
//! outcome (server or failure) is kept until [`LocalRuntime::stop`], which is
//! the only operation that resets it.
//!
//! Startup follows an explicit plan of modes: `[Gpu, Cpu]` when acceleration
//! is enabled, `[Cpu]` otherwise. Only a recognized acceleration failure moves
//! on to the next mode; anything else ends startup.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use notegraph_core::{Error, GenerationBackend, Result, RuntimeDetails};

use super::client::LocalCompletionClient;
use super::process::{
    free_port, is_acceleration_failure, LaunchSpec, LlamaServerLauncher, OutputTail,
    ServerLauncher, ServerMode, ServerProcess,
};
use super::shutdown::{install_signal_handlers, lock, track, SharedChild};
use crate::config::LocalConfig;

/// Provider label reported in lane results.
pub const PROVIDER_NAME: &str = "llama.cpp";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

type StartResult = std::result::Result<Arc<LocalServer>, String>;
type StartFuture = Shared<BoxFuture<'static, StartResult>>;

/// A healthy server owned by the runtime.
#[derive(Debug)]
pub struct LocalServer {
    base_url: String,
    mode: ServerMode,
    child: SharedChild,
    output: OutputTail,
}

impl LocalServer {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    /// Recent server output.
    pub fn output(&self) -> String {
        self.output.snapshot()
    }

    async fn shutdown(&self) {
        let child = lock(&self.child).take();
        if let Some(mut child) = child {
            match child.kill().await {
                Ok(()) => info!(base_url = %self.base_url, "Local server stopped"),
                Err(e) => warn!(error = %e, "Failed to stop local server"),
            }
        }
    }
}

/// Why one startup attempt failed.
#[derive(Debug)]
enum LaunchFailure {
    /// The acceleration backend could not initialize; the next mode may work.
    Acceleration(String),
    Fatal(String),
}

impl LaunchFailure {
    fn classify(reason: String, output: &str) -> Self {
        let message = if output.trim().is_empty() {
            reason
        } else {
            format!("{}; server output: {}", reason, output.trim())
        };
        if is_acceleration_failure(&message) {
            Self::Acceleration(message)
        } else {
            Self::Fatal(message)
        }
    }

    fn into_message(self) -> String {
        match self {
            Self::Acceleration(m) | Self::Fatal(m) => m,
        }
    }
}

/// Modes to try in order.
fn start_plan(config: &LocalConfig) -> Vec<ServerMode> {
    if config.gpu {
        vec![ServerMode::Gpu, ServerMode::Cpu]
    } else {
        vec![ServerMode::Cpu]
    }
}

/// Poll `/health` until it answers 200, the process exits, or the deadline passes.
async fn wait_until_healthy(
    http: &reqwest::Client,
    process: &mut ServerProcess,
    timeout: Duration,
    poll: Duration,
) -> std::result::Result<(), LaunchFailure> {
    let started = Instant::now();
    let url = format!("{}/health", process.base_url().trim_end_matches('/'));

    loop {
        if let Some(status) = process.exit_status() {
            return Err(LaunchFailure::classify(
                format!("server exited with {} before becoming healthy", status),
                &process.output().snapshot(),
            ));
        }

        let output = process.output().snapshot();
        if is_acceleration_failure(&output) {
            return Err(LaunchFailure::classify(
                "acceleration backend failed to initialize".to_string(),
                &output,
            ));
        }

        match http.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Local server healthy");
                return Ok(());
            }
            Ok(response) => debug!(status = response.status().as_u16(), "Health probe not ready"),
            Err(e) => debug!(error = %e, "Health probe failed"),
        }

        if started.elapsed() >= timeout {
            return Err(LaunchFailure::classify(
                format!("server not healthy after {}s", timeout.as_secs_f32()),
                &process.output().snapshot(),
            ));
        }
        tokio::time::sleep(poll).await;
    }
}

async fn start_once(
    config: &LocalConfig,
    launcher: &dyn ServerLauncher,
    http: &reqwest::Client,
    model_path: &str,
    mode: ServerMode,
) -> std::result::Result<LocalServer, LaunchFailure> {
    let port = free_port(&config.host)
        .await
        .map_err(|e| LaunchFailure::Fatal(format!("no free port on {}: {}", config.host, e)))?;
    let spec = LaunchSpec {
        binary: config.binary.clone(),
        model_path: model_path.to_string(),
        host: config.host.clone(),
        port,
        context_size: config.context_size,
        threads: config.effective_threads(),
        mode,
        gpu_layers: config.gpu_layers,
    };
    info!(server_mode = %mode, port, threads = spec.threads, "Starting local server");

    let mut process = launcher
        .launch(&spec)
        .await
        .map_err(|e| LaunchFailure::classify(e.to_string(), ""))?;

    wait_until_healthy(
        http,
        &mut process,
        config.startup_timeout(),
        config.health_poll_interval(),
    )
    .await?;

    let (base_url, child, output) = process.into_parts();
    let child: SharedChild = Arc::new(Mutex::new(child));
    track(&child);
    info!(server_mode = %mode, base_url = %base_url, "Local server ready");

    Ok(LocalServer {
        base_url,
        mode,
        child,
        output,
    })
}

async fn boot(
    config: LocalConfig,
    launcher: Arc<dyn ServerLauncher>,
    http: reqwest::Client,
) -> StartResult {
    install_signal_handlers();

    let model_path = config.model_path.clone().ok_or_else(|| {
        "no local model configured (set local.model_path or NOTEGRAPH_LOCAL_MODEL)".to_string()
    })?;
    if !Path::new(&model_path).exists() {
        return Err(format!("model file not found: {}", model_path));
    }

    let plan = start_plan(&config);
    for (attempt, mode) in plan.iter().enumerate() {
        match start_once(&config, launcher.as_ref(), &http, &model_path, *mode).await {
            Ok(server) => return Ok(Arc::new(server)),
            Err(LaunchFailure::Acceleration(reason)) if attempt + 1 < plan.len() => {
                warn!(
                    server_mode = %mode,
                    attempt,
                    error = %reason,
                    "Acceleration backend failed, retrying in the next mode"
                );
            }
            Err(failure) => return Err(failure.into_message()),
        }
    }
    Err("no startup mode configured".to_string())
}

/// Owner of the local completion server.
pub struct LocalRuntime {
    config: LocalConfig,
    launcher: Arc<dyn ServerLauncher>,
    http: reqwest::Client,
    client: LocalCompletionClient,
    model_name: String,
    state: Mutex<Option<StartFuture>>,
}

impl LocalRuntime {
    /// Runtime that launches llama.cpp's server.
    pub fn new(config: LocalConfig) -> Result<Self> {
        Self::with_launcher(config, Arc::new(LlamaServerLauncher::default()))
    }

    pub fn with_launcher(config: LocalConfig, launcher: Arc<dyn ServerLauncher>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;
        let model_name = config
            .model_path
            .as_deref()
            .and_then(|p| Path::new(p).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string());
        let client = LocalCompletionClient::new(
            http.clone(),
            model_name.clone(),
            config.n_predict,
            config.temperature,
        );

        Ok(Self {
            config,
            launcher,
            http,
            client,
            model_name,
            state: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Start the server, or join the startup already in flight.
    pub async fn start(&self) -> Result<Arc<LocalServer>> {
        let startup = {
            let mut slot = lock(&self.state);
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let startup = boot(
                        self.config.clone(),
                        Arc::clone(&self.launcher),
                        self.http.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(startup.clone());
                    startup
                }
            }
        };
        startup.await.map_err(Error::Runtime)
    }

    /// Kill the server and forget the memoized startup.
    pub async fn stop(&self) {
        let previous = lock(&self.state).take();
        let server = previous
            .as_ref()
            .and_then(|startup| startup.peek())
            .and_then(|result| result.as_ref().ok())
            .cloned();
        drop(previous);
        if let Some(server) = server {
            server.shutdown().await;
        }
    }

    /// Whether a started server is ready for requests.
    pub fn is_ready(&self) -> bool {
        self.ready_server().is_some()
    }

    /// Acceleration mode of the running server.
    pub fn server_mode(&self) -> Option<ServerMode> {
        self.ready_server().map(|server| server.mode())
    }

    pub fn model_path(&self) -> Option<&str> {
        self.config.model_path.as_deref()
    }

    fn ready_server(&self) -> Option<Arc<LocalServer>> {
        let slot = lock(&self.state);
        slot.as_ref()?.peek()?.as_ref().ok().cloned()
    }
}

#[async_trait]
impl GenerationBackend for LocalRuntime {
    #[instrument(skip(self, system, prompt), fields(provider = PROVIDER_NAME, model = %self.model_name, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let server = self.start().await?;
        let deadline = self.config.request_timeout();
        match tokio::time::timeout(
            deadline,
            self.client.complete(server.base_url(), system, prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "local completion exceeded {}s",
                deadline.as_secs()
            ))),
        }
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn runtime_details(&self) -> Option<RuntimeDetails> {
        Some(RuntimeDetails {
            model_path: self.config.model_path.clone(),
            server_mode: self.server_mode().map(|mode| mode.as_str().to_string()),
            n_predict: Some(self.config.n_predict),
        })
    }
}
