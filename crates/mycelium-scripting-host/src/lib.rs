//! Host runtime for loading and executing Lua scripts
//!
//! Scripts declare the commands and events they handle in a metadata block
//! at the top of the file. This crate parses those declarations, keeps the
//! binding registry, and runs every handler on a single worker thread that
//! owns the Lua state.

pub mod bindings;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod reload;
pub mod scheduler;
pub mod script_scanner;
pub mod worker;

pub use bindings::HostServices;
pub use engine::{Arity, LuaRuntime};
pub use error::{SchedulerError, ScriptError, WorkerError};
pub use metadata::{parse_metadata, BindingDeclaration, CommandDescription, ScriptMetadata};
pub use registry::{BindingRegistry, CommandPrefixes, ScriptUnit, SharedRegistry};
pub use reload::spawn_signal_reload;
pub use scheduler::{TaskScheduler, TimerId, Trigger};
pub use script_scanner::{ScanResult, ScriptScanner};
pub use worker::{
    dispatch_queue, CommandInvocation, DispatchInbox, DispatchQueue, DispatchRequest, LoadOutcome,
    LoadReport, RuntimeWorker, WorkerHandle, WorkerOptions, WorkerState,
};
