//! Turns inbound chat messages into built-in command runs or script
//! command requests.

use mycelium_config::MyceliumConfig;
use mycelium_events::{ChatPlatform, CommandClass, Embed, InboundMessage};
use mycelium_scripting_host::{
    CommandInvocation, CommandPrefixes, DispatchRequest, SharedRegistry, WorkerHandle,
};
use mycelium_services::AudioManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::builtins::Builtin;
use crate::cooldown::{Clock, CooldownTracker};
use crate::permissions::PermissionGate;

/// A message split into its command parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub class: CommandClass,
    /// Lower-cased name with the prefix removed
    pub name: String,
    /// Remainder after the first whitespace run, untouched
    pub args: String,
}

/// Classify and tokenize `content`. The user prefix is checked first.
///
/// Returns `None` when the message carries neither prefix or nothing
/// follows the prefix.
pub fn parse_command(content: &str, prefixes: &CommandPrefixes) -> Option<ParsedCommand> {
    let (class, rest) = if let Some(rest) = content.strip_prefix(prefixes.user.as_str()) {
        (CommandClass::User, rest)
    } else if let Some(rest) = content.strip_prefix(prefixes.moderator.as_str()) {
        (CommandClass::Mod, rest)
    } else {
        return None;
    };

    let (name, args) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        class,
        name: name.to_lowercase(),
        args: args.to_string(),
    })
}

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command, or from a source commands are not accepted from
    Ignored,
    /// Dropped without a reply
    CooldownActive,
    PermissionDenied,
    NotFound,
    Builtin(Builtin),
    /// Submitted to the script worker
    Delegated { handlers: usize },
    /// The script worker no longer accepts requests
    WorkerUnavailable,
}

pub struct CommandDispatcher {
    pub(crate) prefixes: CommandPrefixes,
    pub(crate) bot_name: String,
    allow_dm_commands: bool,
    pub(crate) load_timeout: Duration,
    permissions: PermissionGate,
    cooldowns: Arc<CooldownTracker>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) worker: Arc<WorkerHandle>,
    pub(crate) platform: Arc<dyn ChatPlatform>,
    pub(crate) audio: Arc<AudioManager>,
}

impl CommandDispatcher {
    pub fn new(
        config: &MyceliumConfig,
        worker: Arc<WorkerHandle>,
        platform: Arc<dyn ChatPlatform>,
        audio: Arc<AudioManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let commands = &config.commands;
        Self {
            prefixes: CommandPrefixes::new(commands.user_prefix.clone(), commands.mod_prefix.clone()),
            bot_name: config.bot.name.clone(),
            allow_dm_commands: commands.allow_dm_commands,
            load_timeout: config.scripting.load_timeout(),
            permissions: PermissionGate::new(commands.owner_ids.iter().copied()),
            cooldowns: Arc::new(CooldownTracker::new(commands.cooldown())),
            clock,
            worker,
            platform,
            audio,
        }
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub(crate) fn registry(&self) -> &Arc<SharedRegistry> {
        self.worker.registry()
    }

    pub(crate) fn reply(&self, message: &InboundMessage, embed: Embed) {
        self.platform.send(message.reply_target(), embed.into());
    }

    pub async fn handle_message(&self, message: &InboundMessage) -> DispatchOutcome {
        if message.author.bot || message.webhook {
            return DispatchOutcome::Ignored;
        }
        if message.is_direct() && !self.allow_dm_commands {
            return DispatchOutcome::Ignored;
        }
        let Some(command) = parse_command(&message.content, &self.prefixes) else {
            return DispatchOutcome::Ignored;
        };

        info!(
            target: "commands",
            "Processing {} command from {}: {}",
            command.class,
            message.author.name,
            message.content
        );

        let now = self.clock.now_millis();
        if self.cooldowns.is_active(message.author.id, &command.name, now) {
            self.log_cooldown(message, &command.name);
            return DispatchOutcome::CooldownActive;
        }

        if let Err(denied) = self.permissions.check(command.class, &command.name, &message.author) {
            info!(
                target: "commands",
                "Denied {}{} for {}: {}",
                self.prefixes.for_class(command.class),
                command.name,
                message.author.name,
                denied
            );
            self.reply(message, Embed::error("permission denied", denied.to_string()));
            return DispatchOutcome::PermissionDenied;
        }

        if let Some(builtin) = Builtin::resolve(command.class, &command.name) {
            if !self.cooldowns.try_acquire(message.author.id, &command.name, now) {
                self.log_cooldown(message, &command.name);
                return DispatchOutcome::CooldownActive;
            }
            self.run_builtin(builtin, message, &command.args).await;
            return DispatchOutcome::Builtin(builtin);
        }

        let handlers = self.registry().lookup_command(command.class, &command.name);
        if handlers.is_empty() {
            self.reply(
                message,
                Embed::error(
                    "command not found",
                    format!(
                        "the command `{}` was not found. use `{}help` for available commands.",
                        command.name, self.prefixes.user
                    ),
                ),
            );
            return DispatchOutcome::NotFound;
        }

        // Concurrent requests for the same user and command race past the
        // early check; only one of them wins the stamp.
        if !self.cooldowns.try_acquire(message.author.id, &command.name, now) {
            self.log_cooldown(message, &command.name);
            return DispatchOutcome::CooldownActive;
        }

        let handler_count = handlers.len();
        let request = DispatchRequest::Command(CommandInvocation {
            message: message.clone(),
            class: command.class,
            command: command.name.clone(),
            args: command.args,
            handlers,
        });
        if let Err(e) = self.worker.submit(request) {
            error!(target: "commands", "Could not submit {}: {}", command.name, e);
            self.cooldowns.release(message.author.id, &command.name, now);
            return DispatchOutcome::WorkerUnavailable;
        }

        DispatchOutcome::Delegated {
            handlers: handler_count,
        }
    }

    fn log_cooldown(&self, message: &InboundMessage, command: &str) {
        debug!(
            target: "commands",
            "Cooldown active for user {} on command {}",
            message.author.id,
            command
        );
    }
}
