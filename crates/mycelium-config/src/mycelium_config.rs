use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    command_config::CommandConfig,
    paths::ProjectPaths,
    scripting_config::ScriptingConfig,
    service_config::{AudioConfig, HttpConfig, SchedulerConfig, StorageConfig},
    APP_NAME,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
    #[error("Could not determine a config directory")]
    NoConfigDir,
}

/// Presence settings shown by the platform client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub name: String,
    pub activity: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "Mycelium".to_string(),
            activity: "the network grow".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file under `directory`
    #[serde(default)]
    pub file: bool,

    /// Log directory (default: ~/.local/share/mycelium/logs)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            ProjectPaths::new(APP_NAME)
                .map(|p| p.logs_dir())
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MyceliumConfig {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub scripting: ScriptingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MyceliumConfig {
    pub fn config_path() -> Result<PathBuf, ConfigLoadError> {
        ProjectPaths::new(APP_NAME)
            .map(|p| p.config_file())
            .ok_or(ConfigLoadError::NoConfigDir)
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigLoadError> {
        match Self::load_from(path) {
            Err(ConfigLoadError::NotFound(missing)) => {
                info!("No config at {}, using defaults", missing.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigLoadError> {
        toml::from_str(content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = MyceliumConfig::default();
        assert_eq!(config.commands.user_prefix, "$");
        assert_eq!(config.commands.mod_prefix, "#");
        assert_eq!(config.commands.cooldown_seconds, 3);
        assert!(!config.commands.allow_dm_commands);
        assert_eq!(config.scripting.load_timeout_secs, 30);
        assert!(!config.scripting.hot_reload);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.audio.default_volume, 50);
        assert_eq!(config.scheduler.max_tasks, 64);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = MyceliumConfig::parse(
            r#"
            [commands]
            user_prefix = "!"
            owner_ids = [42]

            [scripting]
            disabled_scripts = ["broken.lua"]
            "#,
        )
        .unwrap();

        assert_eq!(config.commands.user_prefix, "!");
        assert_eq!(config.commands.mod_prefix, "#");
        assert!(config.commands.is_owner(42));
        assert!(!config.commands.is_owner(7));
        assert!(config.scripting.disabled_set().contains("broken.lua"));
        assert_eq!(config.scripting.load_timeout_secs, 30);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = MyceliumConfig::parse("[commands\nuser_prefix = ").unwrap_err();
        assert!(matches!(err, ConfigLoadError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MyceliumConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.commands.user_prefix, "$");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = MyceliumConfig::default();
        config.commands.owner_ids = vec![1, 2];
        config.save_to(&path).unwrap();

        let loaded = MyceliumConfig::load_from(&path).unwrap();
        assert_eq!(loaded.commands.owner_ids, vec![1, 2]);
    }
}
