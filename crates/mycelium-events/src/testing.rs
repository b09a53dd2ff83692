//! Test doubles for the platform boundary.
//!
//! [`RecordingPlatform`] captures everything the engine sends so tests can
//! assert on replies without a gateway connection.

use parking_lot::Mutex;
use std::time::Duration;

use crate::{ChatPlatform, Reply, ReplyTarget};

/// A [`ChatPlatform`] that records outbound traffic
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    sent: Mutex<Vec<(ReplyTarget, Reply)>>,
    purges: Mutex<Vec<(u64, u32)>>,
    latency: Option<Duration>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// All replies sent so far, in send order
    pub fn sent(&self) -> Vec<(ReplyTarget, Reply)> {
        self.sent.lock().clone()
    }

    /// Replies flattened to text: embed replies become `"<title>: <description>"`
    pub fn sent_text(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|(_, reply)| match reply {
                Reply::Text(text) => text.clone(),
                Reply::Embed(embed) => format!("{}: {}", embed.title, embed.description),
            })
            .collect()
    }

    pub fn purges(&self) -> Vec<(u64, u32)> {
        self.purges.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
        self.purges.lock().clear();
    }
}

impl ChatPlatform for RecordingPlatform {
    fn send(&self, target: ReplyTarget, reply: Reply) {
        self.sent.lock().push((target, reply));
    }

    fn purge_recent(&self, channel_id: u64, limit: u32) {
        self.purges.lock().push((channel_id, limit));
    }

    fn gateway_latency(&self) -> Option<Duration> {
        self.latency
    }
}
