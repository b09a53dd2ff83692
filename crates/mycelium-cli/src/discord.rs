//! Serenity adapter: outbound replies and inbound gateway events.

use mycelium_events::{ChatPlatform, Embed, InboundMessage, Reply, ReplyTarget, Sender};
use mycelium_runner::{CommandDispatcher, EventFanout};
use parking_lot::Mutex;
use serenity::all::{
    ActivityData, ChannelId, Context, CreateEmbed, CreateEmbedFooter, CreateMessage, EventHandler,
    GetMessages, GuildId, Member, Message, MessageId, Ready, Timestamp, User, UserId, VoiceState,
};
use serenity::gateway::ShardManager;
use serenity::http::Http;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// How long the purge confirmation stays up
const CONFIRMATION_TTL: Duration = Duration::from_secs(3);
/// Most messages Discord returns per history request
const HISTORY_PAGE: u32 = 100;

// ============================================================================
// Outbound
// ============================================================================

pub struct SerenityPlatform {
    http: Arc<Http>,
    runtime: Handle,
    latency: Mutex<Option<Duration>>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, runtime: Handle) -> Self {
        Self {
            http,
            runtime,
            latency: Mutex::new(None),
        }
    }

    /// Poll shard heartbeat latency so `gateway_latency` stays current
    pub fn track_latency(self: &Arc<Self>, shard_manager: Arc<ShardManager>, every: Duration) {
        let platform = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let latency = {
                    let runners = shard_manager.runners.lock().await;
                    runners.values().find_map(|runner| runner.latency)
                };
                *platform.latency.lock() = latency;
            }
        });
    }
}

impl ChatPlatform for SerenityPlatform {
    fn send(&self, target: ReplyTarget, reply: Reply) {
        if target.channel_id == 0 {
            warn!(target: "events", "Dropping reply without a channel");
            return;
        }

        let http = Arc::clone(&self.http);
        self.runtime.spawn(async move {
            let channel = ChannelId::new(target.channel_id);
            let mut builder = match reply {
                Reply::Text(text) => CreateMessage::new().content(text),
                Reply::Embed(embed) => CreateMessage::new().embed(to_create_embed(embed)),
            };
            if let Some(message_id) = target.message_id {
                builder = builder.reference_message((channel, MessageId::new(message_id)));
            }
            if let Err(e) = channel.send_message(&http, builder).await {
                error!("Failed to send Discord message: {}", e);
            }
        });
    }

    fn purge_recent(&self, channel_id: u64, limit: u32) {
        if channel_id == 0 {
            return;
        }

        let http = Arc::clone(&self.http);
        self.runtime.spawn(async move {
            let channel = ChannelId::new(channel_id);
            let request = GetMessages::new().limit(limit.min(HISTORY_PAGE) as u8);
            let messages = match channel.messages(&http, request).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!("Failed to fetch history for channel {}: {}", channel_id, e);
                    return;
                }
            };

            let mut deleted = 0;
            for message in messages.iter().filter(|m| !m.pinned) {
                match message.delete(&http).await {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("Failed to delete message {}: {}", message.id, e),
                }
            }

            let confirmation = Embed::success("cleanup complete", format!("deleted {deleted} messages."));
            let builder = CreateMessage::new().embed(to_create_embed(confirmation));
            match channel.send_message(&http, builder).await {
                Ok(sent) => {
                    tokio::time::sleep(CONFIRMATION_TTL).await;
                    if let Err(e) = sent.delete(&http).await {
                        debug!("Failed to delete cleanup confirmation: {}", e);
                    }
                }
                Err(e) => error!("Failed to send cleanup confirmation: {}", e),
            }
        });
    }

    fn gateway_latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}

pub fn to_create_embed(embed: Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new()
        .title(embed.title)
        .description(embed.description)
        .colour(embed.color);
    for field in embed.fields {
        builder = builder.field(field.name, field.value, field.inline);
    }
    if let Some(footer) = embed.footer {
        builder = builder.footer(CreateEmbedFooter::new(footer));
    }
    if embed.timestamp {
        builder = builder.timestamp(Timestamp::now());
    }
    builder
}

/// `"watching the network grow"` -> watching "the network grow".
/// Text without a known leading verb is shown as watching.
pub fn activity(text: &str) -> ActivityData {
    let (verb, rest) = text.split_once(' ').unwrap_or((text, ""));
    match verb.to_lowercase().as_str() {
        "playing" => ActivityData::playing(rest),
        "listening" => ActivityData::listening(rest.strip_prefix("to ").unwrap_or(rest)),
        "competing" => ActivityData::competing(rest.strip_prefix("in ").unwrap_or(rest)),
        "watching" => ActivityData::watching(rest),
        _ => ActivityData::watching(text),
    }
}

// ============================================================================
// Inbound
// ============================================================================

pub struct Handler {
    dispatcher: Arc<CommandDispatcher>,
    events: EventFanout,
    activity: String,
    mod_prefix: String,
}

impl Handler {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        events: EventFanout,
        activity: String,
        mod_prefix: String,
    ) -> Self {
        Self {
            dispatcher,
            events,
            activity,
            mod_prefix,
        }
    }
}

/// Administrator or manage-guild in `guild_id`
async fn is_elevated(ctx: &Context, guild_id: GuildId, user_id: UserId) -> bool {
    let member = match guild_id.member(ctx, user_id).await {
        Ok(member) => member,
        Err(e) => {
            warn!("Failed to fetch member {} of guild {}: {}", user_id, guild_id, e);
            return false;
        }
    };
    let permissions = match ctx.cache.guild(guild_id) {
        Some(guild) => guild.member_permissions(&member),
        None => return false,
    };
    permissions.administrator() || permissions.manage_guild()
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(target: "events", "Discord bot logged in as: {}", ready.user.name);
        ctx.set_activity(Some(activity(&self.activity)));
        self.events
            .ready(ready.user.id.get(), &ready.user.name, ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Only mod commands need the permission lookup
        let elevated = match msg.guild_id {
            Some(guild_id) if !msg.author.bot && msg.content.starts_with(&self.mod_prefix) => {
                is_elevated(&ctx, guild_id, msg.author.id).await
            }
            _ => false,
        };

        let inbound = InboundMessage {
            message_id: msg.id.get(),
            channel_id: msg.channel_id.get(),
            guild_id: msg.guild_id.map(|id| id.get()),
            author: Sender {
                id: msg.author.id.get(),
                name: msg.author.name.clone(),
                bot: msg.author.bot,
                elevated,
            },
            content: msg.content.clone(),
            webhook: msg.webhook_id.is_some(),
            timestamp_ms: msg.timestamp.unix_timestamp() * 1000,
        };

        self.events.message_received(&inbound);
        let outcome = self.dispatcher.handle_message(&inbound).await;
        debug!(target: "commands", "Message {} -> {:?}", inbound.message_id, outcome);
    }

    async fn guild_member_addition(&self, _: Context, new_member: Member) {
        self.events.member_joined(
            new_member.guild_id.get(),
            new_member.user.id.get(),
            &new_member.user.name,
        );
    }

    async fn guild_member_removal(
        &self,
        _: Context,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        self.events.member_left(guild_id.get(), user.id.get(), &user.name);
    }

    async fn voice_state_update(&self, _: Context, old: Option<VoiceState>, new: VoiceState) {
        self.events.voice_updated(
            new.guild_id.map(|id| id.get()),
            new.user_id.get(),
            old.and_then(|state| state.channel_id).map(|id| id.get()),
            new.channel_id.map(|id| id.get()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::ActivityType;

    #[test]
    fn test_activity_verbs() {
        let watching = activity("watching the network grow");
        assert_eq!(watching.kind, ActivityType::Watching);
        assert_eq!(watching.name, "the network grow");

        let listening = activity("listening to spores");
        assert_eq!(listening.kind, ActivityType::Listening);
        assert_eq!(listening.name, "spores");

        let fallback = activity("growing");
        assert_eq!(fallback.kind, ActivityType::Watching);
        assert_eq!(fallback.name, "growing");
    }

    #[test]
    fn test_embed_conversion_keeps_fields() {
        let embed = Embed::info("help", "commands")
            .with_field("user commands", "`$ping`", false)
            .with_footer("requested by: alice");
        let json = serde_json::to_value(to_create_embed(embed)).unwrap();

        assert_eq!(json["title"], "help");
        assert_eq!(json["description"], "commands");
        assert_eq!(json["color"], 0x3498DB);
        assert_eq!(json["fields"][0]["name"], "user commands");
        assert_eq!(json["footer"]["text"], "requested by: alice");
    }
}
