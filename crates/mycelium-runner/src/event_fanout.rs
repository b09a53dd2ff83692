//! Forwards platform lifecycle events to script handlers.

use mycelium_events::{EventKind, InboundMessage};
use mycelium_scripting_host::{DispatchQueue, DispatchRequest, SharedRegistry};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventFanout {
    registry: Arc<SharedRegistry>,
    queue: DispatchQueue,
}

impl EventFanout {
    pub fn new(registry: Arc<SharedRegistry>, queue: DispatchQueue) -> Self {
        Self { registry, queue }
    }

    /// Submit `payload` to the worker if any script handles `kind`.
    ///
    /// Returns whether a request was queued. Never blocks.
    pub fn publish(&self, kind: EventKind, payload: JsonValue) -> bool {
        if !self.registry.has_event(kind.as_str()) {
            return false;
        }

        debug!(target: "events", "Dispatching {} to scripts", kind);
        match self.queue.submit(DispatchRequest::Event {
            event_type: kind.as_str().to_string(),
            payload,
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "events", "Dropped {} event: {}", kind, e);
                false
            }
        }
    }

    pub fn ready(&self, user_id: u64, user_name: &str, guild_count: usize) -> bool {
        self.publish(
            EventKind::Ready,
            json!({
                "type": EventKind::Ready.as_str(),
                "user_id": user_id,
                "user_name": user_name,
                "guild_count": guild_count,
            }),
        )
    }

    pub fn member_joined(&self, guild_id: u64, user_id: u64, user_name: &str) -> bool {
        self.publish(
            EventKind::MemberJoin,
            member_payload(EventKind::MemberJoin, guild_id, user_id, user_name),
        )
    }

    pub fn member_left(&self, guild_id: u64, user_id: u64, user_name: &str) -> bool {
        self.publish(
            EventKind::MemberLeave,
            member_payload(EventKind::MemberLeave, guild_id, user_id, user_name),
        )
    }

    /// Bot-authored messages are not forwarded
    pub fn message_received(&self, message: &InboundMessage) -> bool {
        if message.author.bot {
            return false;
        }
        self.publish(
            EventKind::MessageReceived,
            json!({
                "type": EventKind::MessageReceived.as_str(),
                "message_id": message.message_id,
                "channel_id": message.channel_id,
                "guild_id": message.guild_id,
                "author_id": message.author.id,
                "author_name": message.author.name,
                "content": message.content,
            }),
        )
    }

    pub fn voice_updated(
        &self,
        guild_id: Option<u64>,
        user_id: u64,
        old_channel_id: Option<u64>,
        new_channel_id: Option<u64>,
    ) -> bool {
        self.publish(
            EventKind::VoiceUpdate,
            json!({
                "type": EventKind::VoiceUpdate.as_str(),
                "guild_id": guild_id,
                "user_id": user_id,
                "old_channel_id": old_channel_id,
                "new_channel_id": new_channel_id,
            }),
        )
    }
}

fn member_payload(kind: EventKind, guild_id: u64, user_id: u64, user_name: &str) -> JsonValue {
    json!({
        "type": kind.as_str(),
        "guild_id": guild_id,
        "user_id": user_id,
        "user_name": user_name,
    })
}
