use mycelium_scripting_host::{ScriptScanner, WorkerHandle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Poll `script_dir` every `interval` and request a load when any `.lua`
/// file is added, changed or removed
pub fn spawn_hot_reload(
    worker: Arc<WorkerHandle>,
    script_dir: PathBuf,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scanner = ScriptScanner::new(script_dir);
        info!(
            target: "scripting",
            "Watching {} for script changes ({} tracked)",
            scanner.script_dir().display(),
            scanner.tracked()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let result = scanner.scan();
            if !result.has_changes() {
                continue;
            }

            info!(
                target: "scripting",
                "Script changes detected (changed: {:?}, added: {:?}, removed: {:?}), reloading",
                result.changed,
                result.added,
                result.removed
            );
            if worker.request_load().is_err() {
                debug!(target: "scripting", "Worker closed, stopping script watcher");
                break;
            }
        }
    })
}
