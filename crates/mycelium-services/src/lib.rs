//! Host collaborators that scripts reach through capability handles.
//!
//! Each service is usable from any thread: the script worker calls them
//! synchronously, built-in commands call them from async handlers.

pub mod audio;
pub mod format;
pub mod http;
pub mod storage;
pub mod time;

pub use audio::{AudioError, AudioManager, GuildAudioSnapshot, Track, MAX_VOLUME};
pub use http::HttpClient;
pub use storage::{Row, SqlValue, Storage, StorageError};
pub use time::{format_duration, parse_duration, TimeUnit};
