//! Per-guild play queues.
//!
//! Only queue bookkeeping lives here; streaming audio to a voice channel is
//! the platform adapter's concern.

use mycelium_config::AudioConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub query: String,
    pub requested_by: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("the queue is full ({0} tracks)")]
    QueueFull(usize),
}

/// Point-in-time view of one guild's player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildAudioSnapshot {
    pub now_playing: Option<Track>,
    pub queue: Vec<Track>,
    pub volume: u8,
}

#[derive(Debug)]
struct GuildAudio {
    current: Option<Track>,
    queue: VecDeque<Track>,
    volume: u8,
}

pub const MAX_VOLUME: u8 = 150;

pub struct AudioManager {
    config: AudioConfig,
    guilds: Mutex<HashMap<u64, GuildAudio>>,
}

impl AudioManager {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            guilds: Mutex::new(HashMap::new()),
        }
    }

    fn guild_entry<'a>(
        guilds: &'a mut HashMap<u64, GuildAudio>,
        guild_id: u64,
        default_volume: u8,
    ) -> &'a mut GuildAudio {
        guilds.entry(guild_id).or_insert_with(|| GuildAudio {
            current: None,
            queue: VecDeque::new(),
            volume: default_volume.min(MAX_VOLUME),
        })
    }

    /// Add a track; it starts immediately if nothing is playing.
    ///
    /// Returns the queue position (0 means now playing).
    pub fn enqueue(&self, guild_id: u64, track: Track) -> Result<usize, AudioError> {
        let mut guilds = self.guilds.lock();
        let guild = Self::guild_entry(&mut guilds, guild_id, self.config.default_volume);

        if guild.current.is_none() {
            info!(target: "scripting", "Guild {} now playing {}", guild_id, track.query);
            guild.current = Some(track);
            return Ok(0);
        }

        if guild.queue.len() >= self.config.max_queue_size {
            return Err(AudioError::QueueFull(self.config.max_queue_size));
        }

        guild.queue.push_back(track);
        debug!(target: "scripting", "Guild {} queue length {}", guild_id, guild.queue.len());
        Ok(guild.queue.len())
    }

    /// Advance to the next track, returning the one that was skipped
    pub fn skip(&self, guild_id: u64) -> Option<Track> {
        let mut guilds = self.guilds.lock();
        let guild = guilds.get_mut(&guild_id)?;
        let skipped = guild.current.take();
        guild.current = guild.queue.pop_front();
        skipped
    }

    /// Stop playback and drop the queue; returns how many tracks were removed
    pub fn clear(&self, guild_id: u64) -> usize {
        let mut guilds = self.guilds.lock();
        match guilds.get_mut(&guild_id) {
            Some(guild) => {
                let removed = guild.queue.len() + usize::from(guild.current.is_some());
                guild.queue.clear();
                guild.current = None;
                removed
            }
            None => 0,
        }
    }

    pub fn now_playing(&self, guild_id: u64) -> Option<Track> {
        self.guilds
            .lock()
            .get(&guild_id)
            .and_then(|g| g.current.clone())
    }

    pub fn snapshot(&self, guild_id: u64) -> GuildAudioSnapshot {
        let guilds = self.guilds.lock();
        match guilds.get(&guild_id) {
            Some(guild) => GuildAudioSnapshot {
                now_playing: guild.current.clone(),
                queue: guild.queue.iter().cloned().collect(),
                volume: guild.volume,
            },
            None => GuildAudioSnapshot {
                now_playing: None,
                queue: Vec::new(),
                volume: self.config.default_volume.min(MAX_VOLUME),
            },
        }
    }

    /// Set the volume, clamped to `0..=MAX_VOLUME`; returns the applied value
    pub fn set_volume(&self, guild_id: u64, volume: i64) -> u8 {
        let applied = volume.clamp(0, i64::from(MAX_VOLUME)) as u8;
        let mut guilds = self.guilds.lock();
        Self::guild_entry(&mut guilds, guild_id, self.config.default_volume).volume = applied;
        applied
    }

    /// Drop every guild's player state
    pub fn close(&self) {
        let mut guilds = self.guilds.lock();
        if !guilds.is_empty() {
            info!(target: "scripting", "Closing {} audio player(s)", guilds.len());
        }
        guilds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(query: &str) -> Track {
        Track {
            query: query.to_string(),
            requested_by: 1,
        }
    }

    fn manager(max_queue_size: usize) -> AudioManager {
        AudioManager::new(AudioConfig {
            default_volume: 50,
            max_queue_size,
        })
    }

    #[test]
    fn test_first_track_plays_immediately() {
        let audio = manager(10);
        assert_eq!(audio.enqueue(7, track("a")), Ok(0));
        assert_eq!(audio.enqueue(7, track("b")), Ok(1));
        assert_eq!(audio.now_playing(7), Some(track("a")));
        assert_eq!(audio.snapshot(7).queue, vec![track("b")]);
    }

    #[test]
    fn test_queue_limit() {
        let audio = manager(1);
        audio.enqueue(7, track("a")).unwrap();
        audio.enqueue(7, track("b")).unwrap();
        assert_eq!(audio.enqueue(7, track("c")), Err(AudioError::QueueFull(1)));
    }

    #[test]
    fn test_skip_advances_queue() {
        let audio = manager(10);
        audio.enqueue(7, track("a")).unwrap();
        audio.enqueue(7, track("b")).unwrap();
        assert_eq!(audio.skip(7), Some(track("a")));
        assert_eq!(audio.now_playing(7), Some(track("b")));
        assert_eq!(audio.skip(7), Some(track("b")));
        assert_eq!(audio.now_playing(7), None);
        assert_eq!(audio.skip(99), None);
    }

    #[test]
    fn test_volume_is_clamped() {
        let audio = manager(10);
        assert_eq!(audio.snapshot(7).volume, 50);
        assert_eq!(audio.set_volume(7, 400), MAX_VOLUME);
        assert_eq!(audio.set_volume(7, -3), 0);
        assert_eq!(audio.snapshot(7).volume, 0);
    }

    #[test]
    fn test_clear_and_close() {
        let audio = manager(10);
        audio.enqueue(7, track("a")).unwrap();
        audio.enqueue(7, track("b")).unwrap();
        assert_eq!(audio.clear(7), 2);
        assert_eq!(audio.clear(7), 0);
        audio.enqueue(8, track("c")).unwrap();
        audio.close();
        assert_eq!(audio.now_playing(8), None);
    }
}
