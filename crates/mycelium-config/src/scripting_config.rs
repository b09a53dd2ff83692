use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::ProjectPaths;
use crate::APP_NAME;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Directory containing `.lua` scripts (default: ~/.local/share/mycelium/scripts)
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// Script file names that are never loaded
    #[serde(default)]
    pub disabled_scripts: Vec<String>,

    /// How long a reload caller waits for the worker to confirm (default: 30s)
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// Whether the script directory is watched for changes (default: false)
    #[serde(default)]
    pub hot_reload: bool,

    /// Hot reload scan interval in milliseconds (default: 1000ms)
    #[serde(default = "default_hot_reload_interval")]
    pub hot_reload_interval_ms: u64,
}

fn default_load_timeout() -> u64 {
    30
}

fn default_hot_reload_interval() -> u64 {
    1000
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            script_dir: None,
            disabled_scripts: Vec::new(),
            load_timeout_secs: default_load_timeout(),
            hot_reload: false,
            hot_reload_interval_ms: default_hot_reload_interval(),
        }
    }
}

impl ScriptingConfig {
    /// Get the script directory path (use provided or default)
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(|| {
            ProjectPaths::new(APP_NAME)
                .map(|p| p.scripts_dir())
                .unwrap_or_else(|| PathBuf::from("scripts"))
        })
    }

    pub fn disabled_set(&self) -> HashSet<String> {
        self.disabled_scripts.iter().cloned().collect()
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }
}
