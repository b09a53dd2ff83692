//! Commands implemented natively rather than by scripts.

use mycelium_events::{CommandClass, Embed, InboundMessage};
use mycelium_scripting_host::LoadOutcome;
use mycelium_services::{AudioError, Track, MAX_VOLUME};
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::dispatcher::CommandDispatcher;

const CLEAN_MAX: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Ping,
    Help,
    Play,
    Skip,
    Queue,
    Volume,
    NowPlaying,
    Config,
    Permissions,
    Clean,
    Reload,
}

impl Builtin {
    pub const ALL: [Builtin; 11] = [
        Builtin::Ping,
        Builtin::Help,
        Builtin::Play,
        Builtin::Skip,
        Builtin::Queue,
        Builtin::Volume,
        Builtin::NowPlaying,
        Builtin::Config,
        Builtin::Permissions,
        Builtin::Clean,
        Builtin::Reload,
    ];

    pub fn resolve(class: CommandClass, name: &str) -> Option<Builtin> {
        Self::ALL
            .into_iter()
            .find(|b| b.class() == class && b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Ping => "ping",
            Builtin::Help => "help",
            Builtin::Play => "play",
            Builtin::Skip => "skip",
            Builtin::Queue => "queue",
            Builtin::Volume => "volume",
            Builtin::NowPlaying => "nowplaying",
            Builtin::Config => "config",
            Builtin::Permissions => "permissions",
            Builtin::Clean => "clean",
            Builtin::Reload => "reload",
        }
    }

    pub fn class(&self) -> CommandClass {
        match self {
            Builtin::Config | Builtin::Permissions | Builtin::Clean | Builtin::Reload => {
                CommandClass::Mod
            }
            _ => CommandClass::User,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Builtin::Ping => "checks bot latency and response time",
            Builtin::Help => "shows this help message with all available commands",
            Builtin::Play => "plays audio from youtube or other sources",
            Builtin::Skip => "skips the current track",
            Builtin::Queue => "shows the current playback queue",
            Builtin::Volume => "adjusts the playback volume",
            Builtin::NowPlaying => "shows the currently playing track",
            Builtin::Config => "server configuration management",
            Builtin::Permissions => "manage command permissions",
            Builtin::Clean => "deletes a number of messages",
            Builtin::Reload => "reloads all scripts (owner only)",
        }
    }
}

impl CommandDispatcher {
    pub(crate) async fn run_builtin(&self, builtin: Builtin, message: &InboundMessage, args: &str) {
        let embed = match builtin {
            Builtin::Ping => self.ping(message),
            Builtin::Help => self.help(),
            Builtin::Play => self.play(message, args),
            Builtin::Skip => self.with_guild(message, |guild| match self.audio.skip(guild) {
                Some(track) => Embed::success("music player", format!("skipped **{}**", track.query)),
                None => Embed::info("music player", "nothing is playing."),
            }),
            Builtin::Queue => self.with_guild(message, |guild| self.queue(guild)),
            Builtin::Volume => self.with_guild(message, |guild| self.volume(guild, args)),
            Builtin::NowPlaying => self.with_guild(message, |guild| match self.audio.now_playing(guild) {
                Some(track) => Embed::info("now playing", track.query),
                None => Embed::info("now playing", "nothing is playing."),
            }),
            Builtin::Config => Embed::info(
                "server configuration",
                "server configuration system - coming soon!\n\n\
                 this will allow you to customize:\n\
                 • command prefixes\n\
                 • welcome messages\n\
                 • log channels\n\
                 • auto-moderation settings",
            ),
            Builtin::Permissions => Embed::info(
                "permission management",
                "permission management system - coming soon!\n\n\
                 this will allow you to:\n\
                 • set command permissions per role\n\
                 • restrict commands to specific users\n\
                 • configure moderator access levels\n\
                 • audit command usage",
            ),
            Builtin::Clean => match self.clean(message, args) {
                Some(embed) => embed,
                None => return,
            },
            Builtin::Reload => self.reload(message).await,
        };

        self.reply(message, embed.with_footer(self.footer(message)));
    }

    fn gateway_ms(&self) -> Option<u128> {
        self.platform.gateway_latency().map(|latency| latency.as_millis())
    }

    fn footer(&self, message: &InboundMessage) -> String {
        let ping = self
            .gateway_ms()
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "n/a".to_string());
        format!("ping: {} | requested by: {}", ping, message.author.name)
    }

    fn with_guild(&self, message: &InboundMessage, run: impl FnOnce(u64) -> Embed) -> Embed {
        match message.guild_id {
            Some(guild) => run(guild),
            None => Embed::error("music player", "this command only works in a server."),
        }
    }

    fn ping(&self, message: &InboundMessage) -> Embed {
        let gateway = self
            .gateway_ms()
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "n/a".to_string());
        let response = if message.timestamp_ms > 0 {
            (self.clock.now_millis() - message.timestamp_ms).max(0)
        } else {
            0
        };
        Embed::success(
            "pong! 🏓",
            format!("**gateway:** {gateway}\n**response:** {response}ms"),
        )
    }

    fn help(&self) -> Embed {
        let user = self.prefixes.user.as_str();
        let moderator = self.prefixes.moderator.as_str();

        let mut user_commands = BTreeMap::new();
        let mut mod_commands = BTreeMap::new();
        for builtin in Builtin::ALL {
            let target = match builtin.class() {
                CommandClass::User => &mut user_commands,
                CommandClass::Mod => &mut mod_commands,
            };
            target.insert(builtin.name().to_string(), builtin.description().to_string());
        }

        let registry = self.registry().snapshot();
        for (token, description) in registry.command_descriptions() {
            if let Some(name) = token.strip_prefix(user) {
                user_commands
                    .entry(name.to_string())
                    .or_insert_with(|| description.clone());
            } else if let Some(name) = token.strip_prefix(moderator) {
                mod_commands
                    .entry(name.to_string())
                    .or_insert_with(|| description.clone());
            }
        }

        let list = |prefix: &str, commands: &BTreeMap<String, String>| {
            commands
                .iter()
                .map(|(name, description)| format!("`{prefix}{name}` - {description}\n"))
                .collect::<String>()
        };

        let mut embed = Embed::info(
            format!("{} bot help", self.bot_name.to_lowercase()),
            format!("here are all available commands. use `{user}command` or `{moderator}command`"),
        );
        if !user_commands.is_empty() {
            embed = embed.with_field("user commands", list(user, &user_commands), false);
        }
        if !mod_commands.is_empty() {
            embed = embed.with_field("moderation commands", list(moderator, &mod_commands), false);
        }
        embed.with_field(
            "need more help?",
            format!(
                "• use `{user}command` to execute a command\n\
                 • use `{moderator}command` for moderation\n\
                 • check script files for command-specific usage"
            ),
            false,
        )
    }

    fn play(&self, message: &InboundMessage, args: &str) -> Embed {
        if args.trim().is_empty() {
            return Embed::error(
                "usage",
                format!("`{}play <url or search query>`", self.prefixes.user),
            );
        }
        self.with_guild(message, |guild| {
            let track = Track {
                query: args.trim().to_string(),
                requested_by: message.author.id,
            };
            match self.audio.enqueue(guild, track) {
                Ok(0) => Embed::success("music player", format!("now playing: {}", args.trim())),
                Ok(position) => Embed::info(
                    "music player",
                    format!("added to queue at position {}: {}", position, args.trim()),
                ),
                Err(AudioError::QueueFull(limit)) => Embed::error(
                    "queue full",
                    format!("the queue already holds {limit} tracks."),
                ),
            }
        })
    }

    fn queue(&self, guild: u64) -> Embed {
        let snapshot = self.audio.snapshot(guild);
        if snapshot.now_playing.is_none() && snapshot.queue.is_empty() {
            return Embed::info("music queue", "the queue is empty.");
        }

        let mut text = String::new();
        if let Some(current) = &snapshot.now_playing {
            text.push_str(&format!("**now playing:** {}\n", current.query));
        }
        for (index, track) in snapshot.queue.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", index + 1, track.query));
        }
        Embed::info("music queue", text)
    }

    fn volume(&self, guild: u64, args: &str) -> Embed {
        let args = args.trim();
        if args.is_empty() {
            let current = self.audio.snapshot(guild).volume;
            return Embed::info("volume control", format!("current volume: {current}%"));
        }
        match args.parse::<i64>() {
            Ok(requested) => {
                let applied = self.audio.set_volume(guild, requested);
                Embed::success("volume control", format!("volume set to {applied}%"))
            }
            Err(_) => Embed::error(
                "usage",
                format!("`{}volume [0-{}]`", self.prefixes.user, MAX_VOLUME),
            ),
        }
    }

    /// Returns `None` once the purge is handed to the platform, which posts
    /// its own confirmation
    fn clean(&self, message: &InboundMessage, args: &str) -> Option<Embed> {
        match args.trim().parse::<i64>() {
            Ok(amount) if (1..=CLEAN_MAX as i64).contains(&amount) => {
                info!(
                    target: "commands",
                    "{} is cleaning {} message(s) in channel {}",
                    message.author.name,
                    amount,
                    message.channel_id
                );
                // One extra for the command message itself
                self.platform.purge_recent(message.channel_id, amount as u32 + 1);
                None
            }
            Ok(_) => Some(Embed::error(
                "invalid amount",
                format!("please specify a number between 1 and {CLEAN_MAX}."),
            )),
            Err(_) => Some(Embed::error(
                "usage",
                format!("`{}clean <number of messages>`", self.prefixes.moderator),
            )),
        }
    }

    async fn reload(&self, message: &InboundMessage) -> Embed {
        match self.worker.load(self.load_timeout).await {
            Ok(LoadOutcome::Completed(report)) => {
                info!(target: "commands", "Scripts reloaded by owner: {}", message.author.name);
                let mut embed = Embed::success(
                    "reload complete",
                    "all scripts have been reloaded successfully.",
                )
                .with_field("scripts", report.loaded.len().to_string(), true)
                .with_field("commands", report.command_bindings.to_string(), true)
                .with_field("events", report.event_bindings.to_string(), true);
                if !report.failed.is_empty() {
                    let failed = report
                        .failed
                        .iter()
                        .map(|(name, _)| format!("`{name}`"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    embed = embed.with_field("failed to load", failed, false);
                }
                embed
            }
            Ok(LoadOutcome::TimedOut) => Embed::warning(
                "reload not confirmed",
                format!(
                    "script loading is taking longer than {}s and will finish in the background.",
                    self.load_timeout.as_secs()
                ),
            ),
            Err(e) => {
                error!(target: "commands", "Reload requested by {} failed: {}", message.author.name, e);
                Embed::error("reload failed", "the script worker is not running.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_respects_class() {
        assert_eq!(Builtin::resolve(CommandClass::User, "ping"), Some(Builtin::Ping));
        assert_eq!(Builtin::resolve(CommandClass::Mod, "reload"), Some(Builtin::Reload));
        assert_eq!(Builtin::resolve(CommandClass::Mod, "ping"), None);
        assert_eq!(Builtin::resolve(CommandClass::User, "clean"), None);
        assert_eq!(Builtin::resolve(CommandClass::User, "roll"), None);
    }

    #[test]
    fn test_names_are_unique_and_lowercase() {
        let mut names: Vec<_> = Builtin::ALL.iter().map(|b| b.name()).collect();
        assert!(names.iter().all(|n| *n == n.to_lowercase()));
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Builtin::ALL.len());
    }
}
