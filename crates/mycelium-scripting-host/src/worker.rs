//! The runtime worker: one thread that owns the Lua state.
//!
//! Every interaction with scripts is a [`DispatchRequest`] on a FIFO queue.
//! The worker takes one request at a time and runs it to completion before
//! taking the next, so no two calls into Lua ever overlap.

use mycelium_config::MyceliumConfig;
use mycelium_events::{CommandClass, Embed, InboundMessage, Reply};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::bindings::{json_to_lua, HostServices};
use crate::engine::{Arity, LuaRuntime};
use crate::error::{ScriptError, WorkerError};
use crate::metadata::parse_metadata;
use crate::registry::{BindingRegistry, CommandPrefixes, ScriptUnit, SharedRegistry};
use crate::scheduler::TimerId;

// ============================================================================
// Requests
// ============================================================================

/// A command resolved to script handlers at dispatch time
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub message: InboundMessage,
    pub class: CommandClass,
    /// Lower-case command name without prefix
    pub command: String,
    /// Everything after the first whitespace run, or empty
    pub args: String,
    /// Handler names in registration order
    pub handlers: Vec<String>,
}

/// A unit of work for the worker
#[derive(Debug)]
pub enum DispatchRequest {
    /// Discard the Lua state, evaluate every enabled script and publish a new
    /// registry generation
    Load {
        reply: Option<oneshot::Sender<LoadReport>>,
    },
    Command(CommandInvocation),
    /// Handlers are looked up when the request runs
    Event {
        event_type: String,
        payload: JsonValue,
    },
    ScheduledTask {
        id: TimerId,
        script: String,
        handler: String,
    },
    /// Stop after the requests queued before this one
    Shutdown,
}

impl DispatchRequest {
    fn kind(&self) -> &'static str {
        match self {
            DispatchRequest::Load { .. } => "load",
            DispatchRequest::Command(_) => "command",
            DispatchRequest::Event { .. } => "event",
            DispatchRequest::ScheduledTask { .. } => "scheduled task",
            DispatchRequest::Shutdown => "shutdown",
        }
    }
}

/// Outcome of one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub generation: u64,
    /// Scripts evaluated successfully, in load order
    pub loaded: Vec<String>,
    /// Scripts that could not be read or evaluated, with the reason
    pub failed: Vec<(String, String)>,
    /// Scripts skipped because configuration disables them
    pub disabled: Vec<String>,
    pub command_bindings: usize,
    pub event_bindings: usize,
}

/// What a caller waiting on a load observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Completed(LoadReport),
    /// The wait elapsed; the worker finishes the load in the background
    TimedOut,
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Processing = 1,
    Shutdown = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Processing,
            _ => WorkerState::Shutdown,
        }
    }
}

/// Producer side of the worker queue
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<DispatchRequest>,
    state: Arc<AtomicU8>,
}

impl DispatchQueue {
    /// Enqueue without blocking
    pub fn submit(&self, request: DispatchRequest) -> Result<(), WorkerError> {
        if self.state() == WorkerState::Shutdown {
            return Err(WorkerError::Closed);
        }
        self.tx.send(request).map_err(|_| WorkerError::Closed)
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Consumer side of the worker queue
#[derive(Debug)]
pub struct DispatchInbox {
    rx: mpsc::UnboundedReceiver<DispatchRequest>,
}

impl DispatchInbox {
    pub async fn recv(&mut self) -> Option<DispatchRequest> {
        self.rx.recv().await
    }
}

/// Create the queue shared by the worker and everything that feeds it
pub fn dispatch_queue() -> (DispatchQueue, DispatchInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DispatchQueue {
            tx,
            state: Arc::new(AtomicU8::new(WorkerState::Idle as u8)),
        },
        DispatchInbox { rx },
    )
}

// ============================================================================
// Worker
// ============================================================================

/// Where scripts come from and how their commands are spelled
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub script_dir: PathBuf,
    pub disabled_scripts: HashSet<String>,
    pub prefixes: CommandPrefixes,
}

impl WorkerOptions {
    pub fn from_config(config: &MyceliumConfig) -> Self {
        Self {
            script_dir: config.scripting.script_dir(),
            disabled_scripts: config.scripting.disabled_set(),
            prefixes: CommandPrefixes::new(
                config.commands.user_prefix.clone(),
                config.commands.mod_prefix.clone(),
            ),
        }
    }
}

/// Calling conventions for command handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandSignature {
    /// `(event, utils, storage, http, audio, scheduler, time, commandName, args)`
    Rich,
    /// `(event, utils, commandName, args)`
    Reduced,
}

impl CommandSignature {
    const REDUCED_PARAMS: usize = 4;

    /// Lua drops surplus arguments and fills missing ones with nil, so every
    /// handler can take the rich call. Only the legacy four-parameter shape
    /// gets the reduced one.
    fn for_arity(arity: Arity) -> Self {
        if arity.is_exactly(Self::REDUCED_PARAMS) {
            CommandSignature::Reduced
        } else {
            CommandSignature::Rich
        }
    }
}

pub struct RuntimeWorker {
    options: WorkerOptions,
    services: HostServices,
    registry: Arc<SharedRegistry>,
    runtime: Option<LuaRuntime>,
    generation: u64,
}

impl RuntimeWorker {
    /// Start the worker thread. The Lua state is created on that thread by
    /// the first `Load` request.
    pub fn spawn(
        queue: DispatchQueue,
        inbox: DispatchInbox,
        options: WorkerOptions,
        services: HostServices,
        registry: Arc<SharedRegistry>,
    ) -> Result<WorkerHandle, WorkerError> {
        let (exited_tx, exited_rx) = oneshot::channel();
        let thread_queue = queue.clone();
        let thread_registry = Arc::clone(&registry);

        // Lua state is not Send, so the worker is assembled on its own thread
        let thread = std::thread::Builder::new()
            .name("script-worker".to_string())
            .spawn(move || {
                let worker = RuntimeWorker {
                    options,
                    services,
                    generation: thread_registry.generation(),
                    registry: thread_registry,
                    runtime: None,
                };
                worker.run(inbox, thread_queue, exited_tx)
            })
            .map_err(WorkerError::Spawn)?;

        Ok(WorkerHandle {
            queue,
            registry,
            thread: Mutex::new(Some(thread)),
            exited: Mutex::new(Some(exited_rx)),
        })
    }

    fn run(mut self, mut inbox: DispatchInbox, queue: DispatchQueue, exited: oneshot::Sender<()>) {
        info!(target: "scripting", "Script worker started");

        while let Some(request) = inbox.rx.blocking_recv() {
            if matches!(request, DispatchRequest::Shutdown) {
                break;
            }

            queue.set_state(WorkerState::Processing);
            let kind = request.kind();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.handle(request)));
            if result.is_err() {
                error!(target: "scripting", "Script worker recovered from a panic while running a {} request", kind);
            }
            queue.set_state(WorkerState::Idle);
        }

        queue.set_state(WorkerState::Shutdown);
        inbox.rx.close();
        let pending = std::iter::from_fn(|| inbox.rx.try_recv().ok()).count();
        if pending > 0 {
            warn!(target: "scripting", "Dropped {} queued request(s) at shutdown", pending);
        }

        self.runtime = None;
        info!(target: "scripting", "Script worker stopped");
        let _ = exited.send(());
    }

    fn handle(&mut self, request: DispatchRequest) {
        match request {
            DispatchRequest::Load { reply } => {
                let report = self.load();
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            DispatchRequest::Command(invocation) => self.run_command(&invocation),
            DispatchRequest::Event {
                event_type,
                payload,
            } => self.run_event(&event_type, &payload),
            DispatchRequest::ScheduledTask {
                id,
                script,
                handler,
            } => {
                if let Err(e) = self.run_scheduled(&handler) {
                    error!(
                        target: "scripting",
                        "Error in scheduled task {} ({:?} from {}): {}",
                        handler, id, script, e
                    );
                }
            }
            DispatchRequest::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------------

    fn load(&mut self) -> LoadReport {
        self.generation += 1;
        let mut report = LoadReport {
            generation: self.generation,
            ..Default::default()
        };

        debug!(target: "scripting", "Loading scripts from {}", self.options.script_dir.display());

        // Drop the previous state before building the next
        self.runtime = None;
        let runtime = match LuaRuntime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(target: "scripting", "Failed to create Lua runtime: {}", e);
                self.registry.publish(BindingRegistry::build(
                    self.generation,
                    &[],
                    &self.options.prefixes,
                ));
                return report;
            }
        };

        let mut units = Vec::new();
        for path in discover_scripts(&self.options.script_dir) {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            if self.options.disabled_scripts.contains(&name) {
                info!(target: "scripting", "Skipping disabled script: {}", name);
                report.disabled.push(name);
                continue;
            }

            match load_unit(&runtime, &path, &name) {
                Ok(unit) => {
                    info!(
                        target: "scripting",
                        "Loaded script: {} ({} binding(s))",
                        name,
                        unit.bindings.len()
                    );
                    report.loaded.push(name);
                    units.push(unit);
                }
                Err(e) => {
                    warn!(target: "scripting", "Failed to load script {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        let registry = BindingRegistry::build(self.generation, &units, &self.options.prefixes);
        report.command_bindings = registry.command_count();
        report.event_bindings = registry.event_count();
        self.registry.publish(registry);
        self.runtime = Some(runtime);

        info!(
            target: "scripting",
            "Script loading complete: {} loaded, {} failed, {} command binding(s), {} event binding(s)",
            report.loaded.len(),
            report.failed.len(),
            report.command_bindings,
            report.event_bindings
        );
        report
    }

    // ------------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------------

    fn runtime(&self) -> Result<&LuaRuntime, ScriptError> {
        self.runtime.as_ref().ok_or(ScriptError::NotLoaded)
    }

    fn run_command(&self, invocation: &CommandInvocation) {
        debug!(
            target: "scripting",
            "Executing {} command {} with args: {}",
            invocation.class, invocation.command, invocation.args
        );

        for handler in &invocation.handlers {
            match self.invoke_command(handler, invocation) {
                Ok(()) => debug!(target: "scripting", "Executed handler {}", handler),
                Err(e @ (ScriptError::HandlerMissing(_) | ScriptError::NotLoaded)) => {
                    error!(target: "scripting", "Handler function missing or invalid: {} ({})", handler, e);
                    self.reply(
                        &invocation.message,
                        Embed::error(
                            "script error",
                            format!(
                                "the command handler for `{}` is not available.",
                                invocation.command
                            ),
                        ),
                    );
                }
                Err(e) => {
                    error!(target: "scripting", "Error executing command handler {}: {}", handler, e);
                    self.reply(
                        &invocation.message,
                        Embed::error(
                            "execution error",
                            format!("an error occurred while executing the command: {e}"),
                        ),
                    );
                }
            }
        }
    }

    fn invoke_command(&self, handler: &str, invocation: &CommandInvocation) -> Result<(), ScriptError> {
        let runtime = self.runtime()?;
        let function = runtime.function(handler)?;
        let arity = runtime.arity(&function)?;

        let signature = CommandSignature::for_arity(arity);
        debug!(
            target: "scripting",
            "Calling {} with the {:?} signature ({} declared params, variadic: {})",
            handler, signature, arity.params, arity.variadic
        );

        let event = self.services.message_handle(invocation.message.clone());
        let command = invocation.command.as_str();
        let args = invocation.args.as_str();
        let (utils, storage, http, audio, scheduler, time) = self.services.handles();

        match signature {
            CommandSignature::Rich => function.call::<()>((
                event, utils, storage, http, audio, scheduler, time, command, args,
            ))?,
            CommandSignature::Reduced => function.call::<()>((event, utils, command, args))?,
        }
        Ok(())
    }

    fn run_event(&self, event_type: &str, payload: &JsonValue) {
        for handler in self.registry.lookup_event(event_type) {
            if let Err(e) = self.invoke_event(&handler, payload) {
                error!(target: "scripting", "Error in event handler {} for {}: {}", handler, event_type, e);
            }
        }
    }

    fn invoke_event(&self, handler: &str, payload: &JsonValue) -> Result<(), ScriptError> {
        let runtime = self.runtime()?;
        let function = runtime.function(handler)?;
        let event = json_to_lua(runtime.lua(), payload)?;
        let (utils, storage, http, audio, scheduler, time) = self.services.handles();
        function.call::<()>((event, utils, storage, http, audio, scheduler, time))?;
        Ok(())
    }

    fn run_scheduled(&self, handler: &str) -> Result<(), ScriptError> {
        let runtime = self.runtime()?;
        let function = runtime.function(handler)?;
        let platform = self.services.platform_handle();
        let (utils, storage, http, audio, scheduler, time) = self.services.handles();
        function.call::<()>((platform, utils, storage, http, audio, scheduler, time))?;
        Ok(())
    }

    fn reply(&self, message: &InboundMessage, embed: Embed) {
        self.services
            .platform
            .send(message.reply_target(), Reply::Embed(embed));
    }
}

/// `.lua` files in `dir`, sorted by file name
fn discover_scripts(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(
                target: "scripting",
                "Could not read scripts directory {}: {}",
                dir.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut scripts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("lua"))
        .collect();
    scripts.sort();
    scripts
}

fn load_unit(runtime: &LuaRuntime, path: &Path, name: &str) -> Result<ScriptUnit, ScriptError> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let metadata = parse_metadata(name, &source);
    runtime.eval(name, &source)?;

    Ok(ScriptUnit {
        name: name.to_string(),
        source,
        bindings: metadata.bindings,
        descriptions: metadata.descriptions,
    })
}

// ============================================================================
// Handle
// ============================================================================

/// Owner's handle to a running worker
pub struct WorkerHandle {
    queue: DispatchQueue,
    registry: Arc<SharedRegistry>,
    thread: Mutex<Option<JoinHandle<()>>>,
    exited: Mutex<Option<oneshot::Receiver<()>>>,
}

impl WorkerHandle {
    /// Enqueue a request without waiting for it
    pub fn submit(&self, request: DispatchRequest) -> Result<(), WorkerError> {
        self.queue.submit(request)
    }

    /// A producer handle for timers and other feeders
    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    pub fn registry(&self) -> &Arc<SharedRegistry> {
        &self.registry
    }

    pub fn state(&self) -> WorkerState {
        self.queue.state()
    }

    /// Enqueue a load and wait up to `timeout` for it to finish
    pub async fn load(&self, timeout: Duration) -> Result<LoadOutcome, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.submit(DispatchRequest::Load { reply: Some(tx) })?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(report)) => Ok(LoadOutcome::Completed(report)),
            Ok(Err(_)) => Err(WorkerError::Closed),
            Err(_) => {
                warn!(
                    target: "scripting",
                    "Script loading did not finish within {:?}; continuing in the background",
                    timeout
                );
                Ok(LoadOutcome::TimedOut)
            }
        }
    }

    /// Enqueue a load without waiting for it
    pub fn request_load(&self) -> Result<(), WorkerError> {
        self.submit(DispatchRequest::Load { reply: None })
    }

    /// Stop the worker once the already queued requests have run.
    ///
    /// Waits up to `grace` for the thread to exit, then detaches it.
    pub async fn shutdown(&self, grace: Duration) {
        if self.submit(DispatchRequest::Shutdown).is_err() {
            return;
        }

        let exited = self.exited.lock().take();
        let Some(exited) = exited else { return };

        match tokio::time::timeout(grace, exited).await {
            Ok(_) => {
                if let Some(thread) = self.thread.lock().take() {
                    if thread.join().is_err() {
                        error!(target: "scripting", "Script worker thread panicked");
                    }
                }
            }
            Err(_) => {
                warn!(
                    target: "scripting",
                    "Script worker did not stop within {:?}; detaching it",
                    grace
                );
                self.thread.lock().take();
            }
        }
    }
}
