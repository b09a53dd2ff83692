//! Builder that wires the services, script worker, dispatcher and fan-out
//! into a running bot.

use mycelium_config::MyceliumConfig;
use mycelium_events::ChatPlatform;
use mycelium_scripting_host::{
    dispatch_queue, spawn_signal_reload, HostServices, LoadOutcome, RuntimeWorker, SharedRegistry,
    TaskScheduler, WorkerError, WorkerHandle, WorkerOptions,
};
use mycelium_services::{AudioManager, HttpClient, Storage, StorageError};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cooldown::{Clock, SystemClock, SWEEP_INTERVAL};
use crate::dispatcher::CommandDispatcher;
use crate::event_fanout::EventFanout;
use crate::hot_reload::spawn_hot_reload;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Chat platform not specified - use .with_platform()")]
    MissingPlatform,

    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to start the script worker: {0}")]
    Worker(#[from] WorkerError),
}

pub struct BotBuilder {
    config: MyceliumConfig,
    platform: Option<Arc<dyn ChatPlatform>>,
    clock: Arc<dyn Clock>,
    storage: Option<Arc<Storage>>,
    background: bool,
}

impl BotBuilder {
    pub fn new(config: MyceliumConfig) -> Self {
        Self {
            config,
            platform: None,
            clock: Arc::new(SystemClock),
            storage: None,
            background: true,
        }
    }

    pub fn with_platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use this storage instead of opening `storage.database_path`
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Skip the cooldown sweeper, script watcher and signal handler
    pub fn without_background_tasks(mut self) -> Self {
        self.background = false;
        self
    }

    /// Start the worker and run the initial script load.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(self) -> Result<Bot, BuildError> {
        let platform = self.platform.ok_or(BuildError::MissingPlatform)?;
        let config = self.config;
        let runtime = Handle::current();

        let storage = match self.storage {
            Some(storage) => storage,
            None => {
                let path = config.storage.database_path();
                info!(target: "storage", "Opening database at {}", path.display());
                Arc::new(Storage::open(&path)?.with_runtime(runtime.clone()))
            }
        };
        let http = Arc::new(HttpClient::new(config.http.clone()));
        let audio = Arc::new(AudioManager::new(config.audio.clone()));

        let (queue, inbox) = dispatch_queue();
        let scheduler = TaskScheduler::new(queue.clone(), runtime, &config.scheduler);
        let services = HostServices {
            platform: Arc::clone(&platform),
            storage: Arc::clone(&storage),
            http,
            audio: Arc::clone(&audio),
            scheduler: scheduler.clone(),
        };

        let options = WorkerOptions::from_config(&config);
        let script_dir = options.script_dir.clone();
        let registry = Arc::new(SharedRegistry::new());
        let worker = Arc::new(RuntimeWorker::spawn(
            queue.clone(),
            inbox,
            options,
            services,
            Arc::clone(&registry),
        )?);

        match worker.load(config.scripting.load_timeout()).await? {
            LoadOutcome::Completed(report) => info!(
                target: "scripting",
                "Loaded {} script(s) from {} ({} failed, {} disabled): {} command binding(s), {} event binding(s)",
                report.loaded.len(),
                script_dir.display(),
                report.failed.len(),
                report.disabled.len(),
                report.command_bindings,
                report.event_bindings
            ),
            LoadOutcome::TimedOut => warn!(
                target: "scripting",
                "Initial script load still running; commands resolve once it completes"
            ),
        }

        let dispatcher = Arc::new(CommandDispatcher::new(
            &config,
            Arc::clone(&worker),
            platform,
            Arc::clone(&audio),
            Arc::clone(&self.clock),
        ));
        let fanout = EventFanout::new(registry, queue);

        let mut background = Vec::new();
        if self.background {
            let cooldowns = Arc::clone(dispatcher.cooldowns());
            background.push(cooldowns.spawn_sweeper(Arc::clone(&self.clock), SWEEP_INTERVAL));
            if let Some(task) = spawn_signal_reload(Arc::clone(&worker)) {
                background.push(task);
            }
            if config.scripting.hot_reload {
                background.push(spawn_hot_reload(
                    Arc::clone(&worker),
                    script_dir,
                    config.scripting.hot_reload_interval(),
                ));
            }
        }

        Ok(Bot {
            config,
            worker,
            scheduler,
            dispatcher,
            fanout,
            storage,
            audio,
            background,
        })
    }
}

/// A running bot: feed it messages and platform events
pub struct Bot {
    config: MyceliumConfig,
    worker: Arc<WorkerHandle>,
    scheduler: TaskScheduler,
    dispatcher: Arc<CommandDispatcher>,
    fanout: EventFanout,
    storage: Arc<Storage>,
    audio: Arc<AudioManager>,
    background: Vec<JoinHandle<()>>,
}

impl Bot {
    pub fn builder(config: MyceliumConfig) -> BotBuilder {
        BotBuilder::new(config)
    }

    pub fn config(&self) -> &MyceliumConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventFanout {
        &self.fanout
    }

    pub fn worker(&self) -> &Arc<WorkerHandle> {
        &self.worker
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn audio(&self) -> &Arc<AudioManager> {
        &self.audio
    }

    /// Stop timers, drain the worker queue and release the audio queues.
    ///
    /// Each stage waits at most `scheduler.shutdown_grace_secs`.
    pub async fn shutdown(self) {
        info!("Shutting down");
        for task in &self.background {
            task.abort();
        }

        let grace = self.config.scheduler.shutdown_grace();
        self.scheduler.shutdown(grace).await;
        self.worker.shutdown(grace).await;
        self.audio.close();
        info!("Shutdown complete");
    }
}
