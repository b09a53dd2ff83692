use std::path::PathBuf;

/// Failures while loading or calling into scripts
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Lua(#[from] mlua::Error),

    #[error("handler `{0}` is not a function")]
    HandlerMissing(String),

    #[error("no script runtime is loaded")]
    NotLoaded,
}

/// Failures submitting work to the runtime worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("the script worker has shut down")]
    Closed,

    #[error("failed to spawn script worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Failures registering timers
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("the scheduler is shut down")]
    ShutDown,

    #[error("too many scheduled tasks (limit {0})")]
    CapacityReached(usize),

    #[error("repeating tasks need a period greater than zero")]
    ZeroPeriod,

    #[error("{0}")]
    InvalidUnit(String),
}
