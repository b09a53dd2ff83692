pub mod command_config;
pub mod mycelium_config;
pub mod paths;
pub mod scripting_config;
pub mod service_config;

pub use command_config::CommandConfig;
pub use mycelium_config::{BotConfig, ConfigLoadError, LoggingConfig, MyceliumConfig};
pub use paths::ProjectPaths;
pub use scripting_config::ScriptingConfig;
pub use service_config::{AudioConfig, HttpConfig, SchedulerConfig, StorageConfig};

/// Application name used for config and data directories
pub const APP_NAME: &str = "mycelium";
