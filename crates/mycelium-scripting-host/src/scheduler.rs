//! Timers that scripts register to run handlers later.
//!
//! Timers live on the tokio runtime. A firing timer never touches the Lua
//! state: it only enqueues a `ScheduledTask` request for the worker.

use mycelium_config::SchedulerConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::worker::{DispatchQueue, DispatchRequest};

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for TimerId {
    fn from(id: u64) -> Self {
        TimerId(id)
    }
}

/// When a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fires once after the delay and is removed
    Once { delay: Duration },
    /// Fires after the initial delay, then every period until cancelled
    Repeating { initial: Duration, period: Duration },
}

/// A pending timer
struct ScheduledEntry {
    script: String,
    handler: String,
    trigger: Trigger,
    task: JoinHandle<()>,
}

struct SchedulerInner {
    queue: DispatchQueue,
    runtime: Handle,
    max_tasks: usize,
    next_id: AtomicU64,
    accepting: AtomicBool,
    tasks: Mutex<HashMap<TimerId, ScheduledEntry>>,
}

/// Shared handle to the timer pool
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    /// `runtime` is the tokio runtime timers are spawned on, so timers can be
    /// registered from threads outside it (the script worker)
    pub fn new(queue: DispatchQueue, runtime: Handle, config: &SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue,
                runtime,
                max_tasks: config.max_tasks,
                next_id: AtomicU64::new(1),
                accepting: AtomicBool::new(true),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `handler` once after `delay`
    pub fn schedule_once(
        &self,
        script: &str,
        handler: &str,
        delay: Duration,
    ) -> Result<TimerId, SchedulerError> {
        self.schedule(script, handler, Trigger::Once { delay })
    }

    /// Run `handler` after `initial`, then every `period`
    pub fn schedule_repeating(
        &self,
        script: &str,
        handler: &str,
        initial: Duration,
        period: Duration,
    ) -> Result<TimerId, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        self.schedule(script, handler, Trigger::Repeating { initial, period })
    }

    fn schedule(
        &self,
        script: &str,
        handler: &str,
        trigger: Trigger,
    ) -> Result<TimerId, SchedulerError> {
        // Held across the spawn so the task cannot remove its entry before it
        // exists, and across the `accepting` check so shutdown cannot drain
        // between the check and the insert
        let mut tasks = self.inner.tasks.lock();
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }
        if tasks.len() >= self.inner.max_tasks {
            return Err(SchedulerError::CapacityReached(self.inner.max_tasks));
        }

        let id = TimerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let task = self.inner.runtime.spawn(run_timer(
            Arc::downgrade(&self.inner),
            id,
            script.to_string(),
            handler.to_string(),
            trigger,
        ));

        tasks.insert(
            id,
            ScheduledEntry {
                script: script.to_string(),
                handler: handler.to_string(),
                trigger,
                task,
            },
        );

        debug!(
            target: "scheduler",
            "Scheduled {:?} for {}::{} ({:?})",
            id, script, handler, trigger
        );
        Ok(id)
    }

    /// Cancel a timer; returns false if it already fired or never existed
    pub fn cancel(&self, id: TimerId) -> bool {
        match self.inner.tasks.lock().remove(&id) {
            Some(entry) => {
                entry.task.abort();
                debug!(
                    target: "scheduler",
                    "Cancelled {:?} ({}::{}, {:?})",
                    id, entry.script, entry.handler, entry.trigger
                );
                true
            }
            None => false,
        }
    }

    /// Get the number of pending timers
    pub fn active_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Stop accepting timers and cancel the pending ones, waiting up to
    /// `grace` for them to wind down
    pub async fn shutdown(&self, grace: Duration) {
        let entries: Vec<ScheduledEntry> = {
            let mut tasks = self.inner.tasks.lock();
            self.inner.accepting.store(false, Ordering::SeqCst);
            tasks.drain().map(|(_, entry)| entry).collect()
        };
        if entries.is_empty() {
            return;
        }

        info!(target: "scheduler", "Cancelling {} scheduled task(s)", entries.len());
        for entry in &entries {
            entry.task.abort();
        }

        let drained = tokio::time::timeout(grace, async {
            for entry in entries {
                let _ = entry.task.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(target: "scheduler", "Scheduled tasks did not stop within {:?}", grace);
        }
    }
}

async fn run_timer(
    inner: std::sync::Weak<SchedulerInner>,
    id: TimerId,
    script: String,
    handler: String,
    trigger: Trigger,
) {
    let fire = |inner: &SchedulerInner| {
        inner.queue.submit(DispatchRequest::ScheduledTask {
            id,
            script: script.clone(),
            handler: handler.clone(),
        })
    };

    match trigger {
        Trigger::Once { delay } => {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else { return };
            inner.tasks.lock().remove(&id);
            if fire(&inner).is_err() {
                debug!(target: "scheduler", "Worker closed, dropping {:?}", id);
            }
        }
        Trigger::Repeating { initial, period } => {
            let start = tokio::time::Instant::now() + initial;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else { return };
                if fire(&inner).is_err() {
                    debug!(target: "scheduler", "Worker closed, stopping {:?}", id);
                    inner.tasks.lock().remove(&id);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::dispatch_queue;

    fn config(max_tasks: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_tasks,
            shutdown_grace_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_once_enqueues_scheduled_task() {
        let (queue, mut inbox) = dispatch_queue();
        let scheduler = TaskScheduler::new(queue, Handle::current(), &config(8));

        let id = scheduler
            .schedule_once("daily.lua", "tick", Duration::from_millis(20))
            .unwrap();
        assert_eq!(scheduler.active_count(), 1);

        let request = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        match request {
            DispatchRequest::ScheduledTask {
                id: fired,
                script,
                handler,
            } => {
                assert_eq!(fired, id);
                assert_eq!(script, "daily.lua");
                assert_eq!(handler, "tick");
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn test_repeating_fires_until_cancelled() {
        let (queue, mut inbox) = dispatch_queue();
        let scheduler = TaskScheduler::new(queue, Handle::current(), &config(8));

        let id = scheduler
            .schedule_repeating("a.lua", "poll", Duration::from_millis(5), Duration::from_millis(10))
            .unwrap();

        for _ in 0..2 {
            let request = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(request, DispatchRequest::ScheduledTask { .. }));
        }

        assert_eq!(scheduler.active_count(), 1);
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_and_validation() {
        let (queue, _inbox) = dispatch_queue();
        let scheduler = TaskScheduler::new(queue, Handle::current(), &config(1));

        scheduler
            .schedule_once("a.lua", "h", Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            scheduler.schedule_once("a.lua", "h", Duration::from_secs(60)),
            Err(SchedulerError::CapacityReached(1))
        );
        assert_eq!(
            scheduler.schedule_repeating("a.lua", "h", Duration::ZERO, Duration::ZERO),
            Err(SchedulerError::ZeroPeriod)
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_rejects() {
        let (queue, _inbox) = dispatch_queue();
        let scheduler = TaskScheduler::new(queue, Handle::current(), &config(8));

        scheduler
            .schedule_once("a.lua", "h", Duration::from_secs(60))
            .unwrap();
        scheduler
            .schedule_repeating("a.lua", "h", Duration::from_secs(60), Duration::from_secs(60))
            .unwrap();

        scheduler.shutdown(Duration::from_secs(1)).await;
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(
            scheduler.schedule_once("a.lua", "h", Duration::from_millis(1)),
            Err(SchedulerError::ShutDown)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_timer_survives_concurrent_shutdown() {
        let (queue, _inbox) = dispatch_queue();
        let scheduler = TaskScheduler::new(queue, Handle::current(), &config(10_000));
        let barrier = Arc::new(std::sync::Barrier::new(5));

        let registrars: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                let barrier = Arc::clone(&barrier);
                tokio::task::spawn_blocking(move || {
                    barrier.wait();
                    for _ in 0..2_000 {
                        match scheduler.schedule_once("a.lua", "h", Duration::from_secs(60)) {
                            Ok(_) => {}
                            Err(SchedulerError::ShutDown) => return,
                            Err(other) => panic!("unexpected error {other:?}"),
                        }
                    }
                })
            })
            .collect();

        let waiter = Arc::clone(&barrier);
        tokio::task::spawn_blocking(move || waiter.wait()).await.unwrap();
        scheduler.shutdown(Duration::from_secs(1)).await;
        for registrar in registrars {
            registrar.await.unwrap();
        }

        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(
            scheduler.schedule_once("a.lua", "h", Duration::from_millis(1)),
            Err(SchedulerError::ShutDown)
        );
    }
}
