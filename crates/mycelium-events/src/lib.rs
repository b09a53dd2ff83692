/// Core event and platform types for mycelium
///
/// This crate provides the types that cross the boundary between the chat
/// platform client and the dispatch engine, so the scripting host and the
/// runner can be built and tested without a live gateway connection.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod embed;
pub mod message;
pub mod testing;

pub use embed::{Embed, EmbedField};
pub use message::{InboundMessage, Reply, ReplyTarget, Sender};

// ============================================================================
// Command Classes
// ============================================================================

/// Which prefix (and therefore which permission rule) a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandClass {
    User,
    Mod,
}

impl CommandClass {
    /// Parse the `prefix` key used in script metadata (`"user"` or `"mod"`)
    pub fn from_metadata_key(key: &str) -> Option<Self> {
        match key {
            "user" => Some(CommandClass::User),
            "mod" => Some(CommandClass::Mod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandClass::User => "user",
            CommandClass::Mod => "mod",
        }
    }
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Platform Lifecycle Events
// ============================================================================

/// Lifecycle events the platform client forwards to the fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Gateway session is ready
    Ready,
    /// A member joined a guild
    MemberJoin,
    /// A member left (or was removed from) a guild
    MemberLeave,
    /// Any non-bot message was received
    MessageReceived,
    /// A voice state changed
    VoiceUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Ready,
        EventKind::MemberJoin,
        EventKind::MemberLeave,
        EventKind::MessageReceived,
        EventKind::VoiceUpdate,
    ];

    /// Normalized upper-case name used as the registry key
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "READY",
            EventKind::MemberJoin => "MEMBER_JOIN",
            EventKind::MemberLeave => "MEMBER_LEAVE",
            EventKind::MessageReceived => "MESSAGE_RECEIVED",
            EventKind::VoiceUpdate => "VOICE_UPDATE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Platform Trait
// ============================================================================

/// Outbound side of the chat platform client
///
/// Every method is fire-and-forget: implementations queue the request on
/// their own runtime and return immediately, which lets both async command
/// handlers and the synchronous script worker thread call them.
pub trait ChatPlatform: Send + Sync + 'static {
    /// Send a reply to a channel, optionally referencing a message
    fn send(&self, target: ReplyTarget, reply: Reply);

    /// Delete up to `limit` recent non-pinned messages in a channel and post
    /// a short-lived confirmation with the number deleted
    fn purge_recent(&self, channel_id: u64, limit: u32);

    /// Most recent gateway heartbeat latency, if known
    fn gateway_latency(&self) -> Option<Duration>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_class_from_metadata_key() {
        assert_eq!(CommandClass::from_metadata_key("user"), Some(CommandClass::User));
        assert_eq!(CommandClass::from_metadata_key("mod"), Some(CommandClass::Mod));
        assert_eq!(CommandClass::from_metadata_key("admin"), None);
        assert_eq!(CommandClass::from_metadata_key("User"), None);
    }

    #[test]
    fn test_event_kind_names_are_upper_case() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str(), kind.as_str().to_uppercase());
        }
        assert_eq!(EventKind::MemberLeave.to_string(), "MEMBER_LEAVE");
    }
}
