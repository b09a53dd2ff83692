use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefixes, cooldown and ownership settings for the command dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Prefix for user-class commands
    pub user_prefix: String,

    /// Prefix for mod-class commands
    pub mod_prefix: String,

    /// Per-user, per-command cooldown window
    pub cooldown_seconds: u64,

    /// Whether commands are accepted in direct messages
    pub allow_dm_commands: bool,

    /// Users allowed to run owner-only commands such as `reload`
    pub owner_ids: Vec<u64>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            user_prefix: "$".to_string(),
            mod_prefix: "#".to_string(),
            cooldown_seconds: 3,
            allow_dm_commands: false,
            owner_ids: Vec::new(),
        }
    }
}

impl CommandConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}
