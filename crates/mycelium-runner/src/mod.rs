mod bot;
mod builtins;
mod cooldown;
mod dispatcher;
mod event_fanout;
mod hot_reload;
pub mod logging;
mod permissions;

pub use bot::{Bot, BotBuilder, BuildError};
pub use builtins::Builtin;
pub use cooldown::{Clock, CooldownTracker, ManualClock, SystemClock, SWEEP_INTERVAL};
pub use dispatcher::{parse_command, CommandDispatcher, DispatchOutcome, ParsedCommand};
pub use event_fanout::EventFanout;
pub use hot_reload::spawn_hot_reload;
pub use logging::init_logging;
pub use permissions::{PermissionDenied, PermissionGate, RELOAD_COMMAND};
