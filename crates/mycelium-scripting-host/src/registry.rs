//! Binding registry: which script handlers serve which events and commands.
//!
//! A registry is immutable once built. Each load produces a new generation
//! that replaces the previous one in a single pointer swap, so readers see
//! either the old or the new bindings and never a mix.

use mycelium_events::CommandClass;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::metadata::{BindingDeclaration, CommandDescription};

/// One successfully evaluated script
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    /// File name, e.g. `dice.lua`
    pub name: String,
    pub source: String,
    pub bindings: Vec<BindingDeclaration>,
    pub descriptions: Vec<CommandDescription>,
}

/// Prefixes used to build the full command tokens shown in help
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPrefixes {
    pub user: String,
    pub moderator: String,
}

impl CommandPrefixes {
    pub fn new(user: impl Into<String>, moderator: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            moderator: moderator.into(),
        }
    }

    pub fn for_class(&self, class: CommandClass) -> &str {
        match class {
            CommandClass::User => &self.user,
            CommandClass::Mod => &self.moderator,
        }
    }

    /// `$` + `roll` -> `$roll`
    pub fn token(&self, class: CommandClass, name: &str) -> String {
        format!("{}{}", self.for_class(class), name)
    }
}

#[derive(Debug, Default)]
pub struct BindingRegistry {
    generation: u64,
    event_handlers: HashMap<String, Vec<String>>,
    command_handlers: HashMap<(CommandClass, String), Vec<String>>,
    command_descriptions: HashMap<String, String>,
}

impl BindingRegistry {
    /// Build a registry from scripts in load order
    pub fn build(generation: u64, units: &[ScriptUnit], prefixes: &CommandPrefixes) -> Self {
        let mut registry = BindingRegistry {
            generation,
            ..Default::default()
        };

        for unit in units {
            for binding in &unit.bindings {
                match binding {
                    BindingDeclaration::Event {
                        event_type,
                        handler,
                    } => registry
                        .event_handlers
                        .entry(event_type.clone())
                        .or_default()
                        .push(handler.clone()),
                    BindingDeclaration::Command {
                        class,
                        name,
                        handler,
                    } => registry
                        .command_handlers
                        .entry((*class, name.clone()))
                        .or_default()
                        .push(handler.clone()),
                }
            }

            for description in &unit.descriptions {
                let token = prefixes.token(description.class, &description.name);
                if let Entry::Vacant(slot) = registry.command_descriptions.entry(token) {
                    slot.insert(description.description.clone());
                }
            }
        }

        registry
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lookup_event(&self, event_type: &str) -> &[String] {
        self.event_handlers
            .get(&event_type.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn lookup_command(&self, class: CommandClass, name: &str) -> &[String] {
        self.command_handlers
            .get(&(class, name.to_lowercase()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        !self.lookup_event(event_type).is_empty()
    }

    /// Full command token (`$roll`) to description
    pub fn command_descriptions(&self) -> &HashMap<String, String> {
        &self.command_descriptions
    }

    /// Number of distinct (class, name) command bindings
    pub fn command_count(&self) -> usize {
        self.command_handlers.len()
    }

    /// Number of distinct event types with at least one handler
    pub fn event_count(&self) -> usize {
        self.event_handlers.len()
    }
}

/// The currently published registry generation
#[derive(Debug, Default)]
pub struct SharedRegistry {
    current: RwLock<Arc<BindingRegistry>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published registry
    pub fn publish(&self, registry: BindingRegistry) {
        *self.current.write() = Arc::new(registry);
    }

    /// The registry as of now; later publishes do not affect the snapshot
    pub fn snapshot(&self) -> Arc<BindingRegistry> {
        Arc::clone(&self.current.read())
    }

    pub fn lookup_event(&self, event_type: &str) -> Vec<String> {
        self.snapshot().lookup_event(event_type).to_vec()
    }

    pub fn lookup_command(&self, class: CommandClass, name: &str) -> Vec<String> {
        self.snapshot().lookup_command(class, name).to_vec()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.snapshot().has_event(event_type)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, bindings: Vec<BindingDeclaration>) -> ScriptUnit {
        ScriptUnit {
            name: name.to_string(),
            source: String::new(),
            bindings,
            descriptions: Vec::new(),
        }
    }

    fn command(class: CommandClass, name: &str, handler: &str) -> BindingDeclaration {
        BindingDeclaration::Command {
            class,
            name: name.to_string(),
            handler: handler.to_string(),
        }
    }

    fn event(event_type: &str, handler: &str) -> BindingDeclaration {
        BindingDeclaration::Event {
            event_type: event_type.to_string(),
            handler: handler.to_string(),
        }
    }

    fn prefixes() -> CommandPrefixes {
        CommandPrefixes::new("$", "#")
    }

    #[test]
    fn test_handlers_keep_load_order() {
        let units = vec![
            unit("a.lua", vec![event("READY", "aReady"), command(CommandClass::User, "roll", "aRoll")]),
            unit("b.lua", vec![event("READY", "bReady"), command(CommandClass::User, "roll", "bRoll")]),
        ];
        let registry = BindingRegistry::build(1, &units, &prefixes());

        assert_eq!(registry.lookup_event("READY"), ["aReady", "bReady"]);
        assert_eq!(registry.lookup_event("ready"), ["aReady", "bReady"]);
        assert_eq!(registry.lookup_command(CommandClass::User, "ROLL"), ["aRoll", "bRoll"]);
        assert!(registry.lookup_command(CommandClass::Mod, "roll").is_empty());
        assert!(!registry.has_event("MEMBER_JOIN"));
        assert_eq!(registry.command_count(), 1);
        assert_eq!(registry.event_count(), 1);
    }

    #[test]
    fn test_first_description_wins() {
        let mut first = unit("a.lua", vec![]);
        first.descriptions.push(CommandDescription {
            class: CommandClass::Mod,
            name: "kick".into(),
            description: "first".into(),
        });
        let mut second = unit("b.lua", vec![]);
        second.descriptions.push(CommandDescription {
            class: CommandClass::Mod,
            name: "kick".into(),
            description: "second".into(),
        });

        let registry = BindingRegistry::build(1, &[first, second], &prefixes());
        assert_eq!(registry.command_descriptions().get("#kick").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_publish_replaces_whole_generation() {
        let shared = SharedRegistry::new();
        shared.publish(BindingRegistry::build(
            1,
            &[unit("a.lua", vec![command(CommandClass::User, "old", "h")])],
            &prefixes(),
        ));
        let before = shared.snapshot();

        shared.publish(BindingRegistry::build(
            2,
            &[unit("a.lua", vec![command(CommandClass::User, "new", "h")])],
            &prefixes(),
        ));

        assert!(shared.lookup_command(CommandClass::User, "old").is_empty());
        assert_eq!(shared.lookup_command(CommandClass::User, "new"), vec!["h".to_string()]);
        assert_eq!(shared.generation(), 2);

        // Earlier snapshots are unaffected
        assert_eq!(before.generation(), 1);
        assert_eq!(before.lookup_command(CommandClass::User, "old"), ["h"]);
    }
}
