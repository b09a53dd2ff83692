use serde::{Deserialize, Serialize};

use crate::embed::Embed;

/// Identity of the author of an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: u64,
    pub name: String,
    pub bot: bool,
    /// Administrator-equivalent capability in the guild the message came from
    pub elevated: bool,
}

impl Sender {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bot: false,
            elevated: false,
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }
}

/// A text message delivered by the platform client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: u64,
    pub channel_id: u64,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
    pub author: Sender,
    pub content: String,
    pub webhook: bool,
    /// Platform timestamp of the message, in epoch milliseconds
    pub timestamp_ms: i64,
}

impl InboundMessage {
    pub fn new(channel_id: u64, guild_id: Option<u64>, author: Sender, content: impl Into<String>) -> Self {
        Self {
            message_id: 0,
            channel_id,
            guild_id,
            author,
            content: content.into(),
            webhook: false,
            timestamp_ms: 0,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }

    /// Target that replies to this message in its channel
    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            channel_id: self.channel_id,
            message_id: Some(self.message_id).filter(|id| *id != 0),
        }
    }
}

/// Where a reply should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub channel_id: u64,
    /// Message to reference, if the reply should thread onto one
    pub message_id: Option<u64>,
}

impl ReplyTarget {
    pub fn channel(channel_id: u64) -> Self {
        Self {
            channel_id,
            message_id: None,
        }
    }
}

/// Outbound reply content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Text(String),
    Embed(Embed),
}

impl Reply {
    /// Embed payload, if this is an embed reply
    pub fn as_embed(&self) -> Option<&Embed> {
        match self {
            Reply::Embed(embed) => Some(embed),
            Reply::Text(_) => None,
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<Embed> for Reply {
    fn from(embed: Embed) -> Self {
        Reply::Embed(embed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_target_skips_unset_message_id() {
        let msg = InboundMessage::new(10, Some(1), Sender::new(5, "alice"), "$ping");
        assert_eq!(msg.reply_target(), ReplyTarget::channel(10));

        let msg = InboundMessage {
            message_id: 99,
            ..msg
        };
        assert_eq!(msg.reply_target().message_id, Some(99));
    }

    #[test]
    fn test_direct_message_detection() {
        let msg = InboundMessage::new(10, None, Sender::new(5, "alice"), "hi");
        assert!(msg.is_direct());
    }
}
