//! Process-wide tracking of spawned servers so none outlives the host.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use once_cell::sync::{Lazy, OnceCell};
use tokio::process::Child;
use tracing::{info, warn};

pub(crate) type SharedChild = Arc<Mutex<Option<Child>>>;

static TRACKED: Lazy<Mutex<Vec<Weak<Mutex<Option<Child>>>>>> = Lazy::new(|| Mutex::new(Vec::new()));

static SIGNAL_WATCHER: OnceCell<bool> = OnceCell::new();

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remember a child so signal-driven exit can kill it.
pub(crate) fn track(child: &SharedChild) {
    let mut tracked = lock(&TRACKED);
    tracked.retain(|weak| weak.strong_count() > 0);
    tracked.push(Arc::downgrade(child));
}

/// Send a kill to every tracked server still running. Returns how many were signalled.
pub fn kill_all() -> usize {
    let tracked = lock(&TRACKED);
    let mut killed = 0;
    for child in tracked.iter().filter_map(Weak::upgrade) {
        if let Some(child) = lock(&child).as_mut() {
            if child.start_kill().is_ok() {
                killed += 1;
            }
        }
    }
    killed
}

/// Install SIGINT/SIGTERM (ctrl-c elsewhere) handlers once per process.
///
/// The handlers run on their own thread with a private current-thread runtime,
/// so they outlive whichever runtime first started a server. On a signal every
/// tracked server is killed and the process exits with the conventional status
/// (130 or 143). Returns whether the watcher thread is running.
pub(crate) fn install_signal_handlers() -> bool {
    *SIGNAL_WATCHER.get_or_init(|| match spawn_signal_watcher() {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Could not start signal watcher for local servers");
            false
        }
    })
}

fn spawn_signal_watcher() -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("notegraph-signals".to_string())
        .spawn(|| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Could not build signal runtime for local servers");
                    return;
                }
            };
            match runtime.block_on(wait_for_signal()) {
                Some(code) => {
                    let killed = kill_all();
                    info!(killed, "Signal received, local servers stopped");
                    std::process::exit(code);
                }
                None => warn!("Could not register signal handlers for local servers"),
            }
        })
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<i32> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).ok()?;
    let mut terminate = signal(SignalKind::terminate()).ok()?;
    tokio::select! {
        _ = interrupt.recv() => Some(130),
        _ = terminate.recv() => Some(143),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<i32> {
    tokio::signal::ctrl_c().await.ok()?;
    Some(130)
}
