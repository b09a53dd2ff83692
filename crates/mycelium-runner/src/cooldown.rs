//! Per-user command cooldowns.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often expired cooldown entries are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Last invocation time per `(user, command)`
#[derive(Debug)]
pub struct CooldownTracker {
    window_ms: i64,
    last_used: DashMap<(u64, String), i64>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as i64,
            last_used: DashMap::new(),
        }
    }

    /// Whether `user` used `command` less than one window before `now`
    pub fn is_active(&self, user_id: u64, command: &str, now_ms: i64) -> bool {
        self.last_used
            .get(&(user_id, command.to_string()))
            .is_some_and(|last| now_ms - *last < self.window_ms)
    }

    /// Start a window at `now` unless one is still running. The check and the
    /// stamp happen under the same shard lock, so concurrent callers for one
    /// `(user, command)` see exactly one `true` per window.
    pub fn try_acquire(&self, user_id: u64, command: &str, now_ms: i64) -> bool {
        match self.last_used.entry((user_id, command.to_string())) {
            Entry::Occupied(mut last) => {
                if now_ms - *last.get() < self.window_ms {
                    return false;
                }
                last.insert(now_ms);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now_ms);
                true
            }
        }
    }

    /// Undo a `try_acquire` stamped at `stamped_ms`; later stamps are kept
    pub fn release(&self, user_id: u64, command: &str, stamped_ms: i64) {
        self.last_used
            .remove_if(&(user_id, command.to_string()), |_, last| *last == stamped_ms);
    }

    /// Drop entries whose window has passed; returns how many were removed
    pub fn sweep(&self, now_ms: i64) -> usize {
        let before = self.last_used.len();
        self.last_used.retain(|_, last| now_ms - *last <= self.window_ms);
        before - self.last_used.len()
    }

    pub fn len(&self) -> usize {
        self.last_used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_used.is_empty()
    }

    /// Sweep every `period` until the task is aborted
    pub fn spawn_sweeper(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep(clock.now_millis());
                if removed > 0 {
                    debug!(target: "commands", "Swept {} expired cooldown(s)", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_enforced_per_user_and_command() {
        let cooldowns = CooldownTracker::new(Duration::from_secs(3));
        assert!(cooldowns.try_acquire(1, "play", 10_000));

        assert!(cooldowns.is_active(1, "play", 10_000));
        assert!(cooldowns.is_active(1, "play", 12_999));
        assert!(!cooldowns.is_active(1, "play", 13_000));
        assert!(!cooldowns.is_active(2, "play", 10_500));
        assert!(!cooldowns.is_active(1, "skip", 10_500));
    }

    #[test]
    fn test_acquire_inside_window_is_refused() {
        let cooldowns = CooldownTracker::new(Duration::from_secs(3));
        assert!(cooldowns.try_acquire(1, "play", 0));
        assert!(!cooldowns.try_acquire(1, "play", 2_999));
        assert!(cooldowns.try_acquire(1, "play", 5_000));
        assert!(cooldowns.is_active(1, "play", 7_000));
        assert!(!cooldowns.is_active(1, "play", 8_000));
    }

    #[test]
    fn test_release_only_undoes_own_stamp() {
        let cooldowns = CooldownTracker::new(Duration::from_secs(3));
        assert!(cooldowns.try_acquire(1, "play", 1_000));
        cooldowns.release(1, "play", 1_000);
        assert!(cooldowns.is_empty());

        assert!(cooldowns.try_acquire(1, "play", 2_000));
        cooldowns.release(1, "play", 1_000);
        assert!(cooldowns.is_active(1, "play", 2_500));
    }

    #[test]
    fn test_concurrent_acquire_admits_one() {
        let cooldowns = Arc::new(CooldownTracker::new(Duration::from_secs(3)));
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let cooldowns = Arc::clone(&cooldowns);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cooldowns.try_acquire(7, "roll", 10_000)
                })
            })
            .collect();

        let admitted = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_sweep_only_removes_expired() {
        let cooldowns = CooldownTracker::new(Duration::from_secs(3));
        cooldowns.try_acquire(1, "old", 0);
        cooldowns.try_acquire(1, "new", 9_000);

        assert_eq!(cooldowns.sweep(10_000), 1);
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.is_active(1, "new", 10_000));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_millis(), 1_250);
    }
}
