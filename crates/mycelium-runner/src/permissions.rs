use mycelium_events::{CommandClass, Sender};
use std::collections::HashSet;
use thiserror::Error;

/// Name of the mod command that only owners may run
pub const RELOAD_COMMAND: &str = "reload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PermissionDenied {
    #[error("only bot owners can reload scripts.")]
    OwnerOnly,
    #[error("you don't have permission to use this command.")]
    NotElevated,
}

/// Decides who may run which command class
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    owners: HashSet<u64>,
}

impl PermissionGate {
    pub fn new(owners: impl IntoIterator<Item = u64>) -> Self {
        Self {
            owners: owners.into_iter().collect(),
        }
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owners.contains(&user_id)
    }

    pub fn check(
        &self,
        class: CommandClass,
        command: &str,
        sender: &Sender,
    ) -> Result<(), PermissionDenied> {
        match class {
            CommandClass::User => {
                if can_use_user_command(sender) {
                    Ok(())
                } else {
                    Err(PermissionDenied::NotElevated)
                }
            }
            CommandClass::Mod if command == RELOAD_COMMAND => {
                if self.is_owner(sender.id) {
                    Ok(())
                } else {
                    Err(PermissionDenied::OwnerOnly)
                }
            }
            CommandClass::Mod => {
                if sender.elevated {
                    Ok(())
                } else {
                    Err(PermissionDenied::NotElevated)
                }
            }
        }
    }
}

/// User commands are open to everyone
fn can_use_user_command(_sender: &Sender) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_commands_are_open() {
        let gate = PermissionGate::default();
        assert_eq!(gate.check(CommandClass::User, "play", &Sender::new(1, "a")), Ok(()));
    }

    #[test]
    fn test_mod_commands_need_elevation() {
        let gate = PermissionGate::default();
        assert_eq!(
            gate.check(CommandClass::Mod, "clean", &Sender::new(1, "a")),
            Err(PermissionDenied::NotElevated)
        );
        assert_eq!(
            gate.check(CommandClass::Mod, "clean", &Sender::new(1, "a").elevated()),
            Ok(())
        );
    }

    #[test]
    fn test_reload_is_owner_only_even_for_admins() {
        let gate = PermissionGate::new([42]);
        assert_eq!(
            gate.check(CommandClass::Mod, "reload", &Sender::new(1, "admin").elevated()),
            Err(PermissionDenied::OwnerOnly)
        );
        assert_eq!(gate.check(CommandClass::Mod, "reload", &Sender::new(42, "owner")), Ok(()));
    }

    #[test]
    fn test_denial_messages() {
        assert_eq!(
            PermissionDenied::OwnerOnly.to_string(),
            "only bot owners can reload scripts."
        );
        assert_eq!(
            PermissionDenied::NotElevated.to_string(),
            "you don't have permission to use this command."
        );
    }
}
