use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::worker::WorkerHandle;

/// Reload scripts whenever the process receives SIGUSR2
#[cfg(unix)]
pub fn spawn_signal_reload(worker: Arc<WorkerHandle>) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigusr2 = match signal(SignalKind::user_defined2()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target: "scripting", "Failed to register SIGUSR2 handler: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while sigusr2.recv().await.is_some() {
            tracing::info!(target: "scripting", "Received SIGUSR2 - triggering script reload");
            if worker.request_load().is_err() {
                tracing::debug!(target: "scripting", "Worker closed, stopping SIGUSR2 handler");
                break;
            }
        }
    }))
}

/// SIGUSR2 does not exist on this platform
#[cfg(not(unix))]
pub fn spawn_signal_reload(_worker: Arc<WorkerHandle>) -> Option<JoinHandle<()>> {
    tracing::warn!(target: "scripting", "SIGUSR2 reload not supported on this platform");
    None
}
