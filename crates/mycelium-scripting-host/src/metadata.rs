//! Binding declarations embedded in script sources.
//!
//! A script declares its bindings in its first Lua block comment as a JSON
//! array:
//!
//! ```lua
//! --[[
//! [
//!   { "event": "READY", "handler": "onReady" },
//!   { "prefix": "user", "name": "roll", "handler": "rollDice",
//!     "description": "rolls dice, e.g. 2d6" }
//! ]
//! ]]
//! ```

use mycelium_events::CommandClass;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// One binding a script declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingDeclaration {
    Event {
        /// Upper-case event type, e.g. `READY`
        event_type: String,
        handler: String,
    },
    Command {
        class: CommandClass,
        /// Lower-case command name
        name: String,
        handler: String,
    },
}

/// Help text for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescription {
    pub class: CommandClass,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    pub bindings: Vec<BindingDeclaration>,
    pub descriptions: Vec<CommandDescription>,
}

/// Return the body of the first Lua block comment (`--[[ ]]`, `--[==[ ]==]`)
pub fn extract_block(source: &str) -> Option<&str> {
    let mut search_from = 0;

    while let Some(offset) = source[search_from..].find("--[") {
        let open = search_from + offset + 3;
        let rest = &source[open..];
        let level = rest.bytes().take_while(|b| *b == b'=').count();

        if rest.as_bytes().get(level) != Some(&b'[') {
            search_from = open;
            continue;
        }

        let body_start = open + level + 1;
        let close = format!("]{}]", "=".repeat(level));
        return source[body_start..]
            .find(&close)
            .map(|end| source[body_start..body_start + end].trim());
    }

    None
}

/// Parse the binding declarations and help descriptions of one script.
///
/// Never fails: a missing block yields empty metadata and a malformed one is
/// logged and yields no bindings.
pub fn parse_metadata(script_name: &str, source: &str) -> ScriptMetadata {
    let Some(block) = extract_block(source) else {
        debug!(target: "scripting", "No metadata block in {}", script_name);
        return ScriptMetadata::default();
    };

    match serde_json::from_str::<Vec<Value>>(block) {
        Ok(entries) => {
            let objects: Vec<&Map<String, Value>> =
                entries.iter().filter_map(Value::as_object).collect();

            debug!(
                target: "scripting",
                "Parsing metadata from {} - found {} definition(s)",
                script_name,
                objects.len()
            );

            ScriptMetadata {
                bindings: objects.iter().filter_map(|obj| declaration(obj)).collect(),
                descriptions: objects.iter().filter_map(|obj| description(obj)).collect(),
            }
        }
        Err(e) => {
            warn!(target: "scripting", "Error parsing metadata in {}: {}", script_name, e);
            ScriptMetadata {
                bindings: Vec::new(),
                descriptions: harvest_descriptions(block),
            }
        }
    }
}

fn string_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn declaration(obj: &Map<String, Value>) -> Option<BindingDeclaration> {
    let handler = string_field(obj, "handler")?;

    if let Some(event) = string_field(obj, "event") {
        return Some(BindingDeclaration::Event {
            event_type: event.to_uppercase(),
            handler: handler.to_string(),
        });
    }

    let class = CommandClass::from_metadata_key(string_field(obj, "prefix")?)?;
    let name = string_field(obj, "name")?;
    Some(BindingDeclaration::Command {
        class,
        name: name.to_lowercase(),
        handler: handler.to_string(),
    })
}

fn description(obj: &Map<String, Value>) -> Option<CommandDescription> {
    Some(CommandDescription {
        class: CommandClass::from_metadata_key(string_field(obj, "prefix")?)?,
        name: string_field(obj, "name")?.to_lowercase(),
        description: string_field(obj, "description")?.to_string(),
    })
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid object pattern"))
}

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"["']?(name|prefix|description)["']?\s*:\s*["']([^"']*)["']"#)
            .expect("valid pair pattern")
    })
}

/// Pull `name`/`prefix`/`description` triples out of text that is not valid JSON
fn harvest_descriptions(block: &str) -> Vec<CommandDescription> {
    object_pattern()
        .find_iter(block)
        .filter_map(|object| {
            let mut name = None;
            let mut prefix = None;
            let mut text = None;

            for caps in pair_pattern().captures_iter(object.as_str()) {
                let value = caps[2].trim().to_string();
                match &caps[1] {
                    "name" => name = Some(value),
                    "prefix" => prefix = Some(value),
                    _ => text = Some(value),
                }
            }

            Some(CommandDescription {
                class: CommandClass::from_metadata_key(prefix?.as_str())?,
                name: name.filter(|n| !n.is_empty())?.to_lowercase(),
                description: text.filter(|d| !d.is_empty())?,
            })
        })
        .collect()
}
