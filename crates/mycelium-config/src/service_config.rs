use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::paths::ProjectPaths;
use crate::APP_NAME;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file (default: ~/.local/share/mycelium/bot.db)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            ProjectPaths::new(APP_NAME)
                .map(|p| p.database_path())
                .unwrap_or_else(|| PathBuf::from("data/bot.db"))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "MyceliumBot/2.0.0".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub default_volume: u8,
    pub max_queue_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_volume: 50,
            max_queue_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of pending timers across all scripts
    pub max_tasks: usize,

    /// Grace period for draining timers and the script worker on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks: 64,
            shutdown_grace_secs: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
