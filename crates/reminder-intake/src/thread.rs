//! Per-user message threading.
//!
//! Messages a user sends in quick succession (a text, then a photo with a
//! caption, then a screenshot) are one intent. [`MessageThreadCoordinator`]
//! buffers each user's events and flushes them as a single [`MergedIntent`]
//! once the user has been quiet for the debounce window.
//!
//! Every user has their own slot behind their own async mutex. The registry
//! map is locked only long enough to look up, insert or prune a slot, so one
//! user's flush never waits on another's.
//!
//! Each event bumps the buffer's generation and arms a timer tagged with it.
//! A timer that wakes to find a newer generation does nothing, so a reset
//! never needs to cancel the previous timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::error::{IntakeError, Result, ThreadFlushError};
use crate::event::{MergedIntent, RawMessageEvent};

/// Default debounce window.
pub const THREAD_WINDOW: Duration = Duration::from_millis(1000);

/// Consumer of flushed threads.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn handle(&self, intent: MergedIntent) -> anyhow::Result<()>;
}

/// One user's accumulator for the current debounce cycle.
#[derive(Debug, Default)]
pub struct ThreadBuffer {
    events: Vec<RawMessageEvent>,
    deadline: Option<Instant>,
    generation: u64,
}

impl ThreadBuffer {
    /// Append an event and push the flush deadline out to `now + window`.
    /// Returns the generation a timer must present to flush this state.
    pub fn push(&mut self, event: RawMessageEvent, now: Instant, window: Duration) -> u64 {
        self.events.push(event);
        self.deadline = Some(now + window);
        self.generation += 1;
        self.generation
    }

    /// Take the buffered events, leaving an empty buffer. Timers armed before
    /// this call become stale.
    pub fn detach(&mut self) -> Vec<RawMessageEvent> {
        self.deadline = None;
        self.generation += 1;
        std::mem::take(&mut self.events)
    }

    pub fn is_idle(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[derive(Debug, Default)]
struct UserSlot {
    buffer: ThreadBuffer,
    /// Set when the slot has been removed from the registry. A submitter that
    /// raced the removal must fetch a fresh slot.
    retired: bool,
}

type SharedSlot = Arc<Mutex<UserSlot>>;

/// What to do with buffered threads on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Process every pending buffer before stopping.
    Flush,
    /// Discard pending buffers.
    Drop,
}

struct Inner {
    slots: StdMutex<HashMap<String, SharedSlot>>,
    handler: Arc<dyn IntentHandler>,
    window: Duration,
    failures: mpsc::UnboundedSender<ThreadFlushError>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    closing: AtomicBool,
}

/// Debounces bursts of events into one [`MergedIntent`] per user.
#[derive(Clone)]
pub struct MessageThreadCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MessageThreadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageThreadCoordinator")
            .field("window", &self.inner.window)
            .field("tracked_users", &self.tracked_users())
            .finish_non_exhaustive()
    }
}

impl MessageThreadCoordinator {
    /// Create a coordinator and the receiver on which per-user flush failures
    /// are reported. Cancelling `cancel` stops pending timers; pass the same
    /// token to the LLM resolver so shutdown also aborts its calls.
    pub fn new(
        handler: Arc<dyn IntentHandler>,
        window: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<ThreadFlushError>) {
        let (failures, failure_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            slots: StdMutex::new(HashMap::new()),
            handler,
            window,
            failures,
            cancel,
            tracker: TaskTracker::new(),
            closing: AtomicBool::new(false),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            failure_rx,
        )
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Number of users with a live slot.
    pub fn tracked_users(&self) -> usize {
        self.inner.registry().len()
    }

    /// Add an event to its user's thread and (re)arm the flush timer.
    ///
    /// Fails with [`IntakeError::Cancelled`] once shutdown has begun.
    pub async fn submit(&self, event: RawMessageEvent) -> Result<()> {
        let user_id = event.user_id.clone();

        loop {
            if self.inner.is_closing() {
                return Err(IntakeError::Cancelled);
            }
            let slot = self.inner.slot(&user_id);
            let mut guard = slot.lock().await;
            // Shutdown may have drained the registry while we waited. A
            // buffer that still holds events is left for the drain.
            if self.inner.is_closing() {
                if guard.buffer.is_idle() {
                    guard.retired = true;
                    drop(guard);
                    self.inner.forget(&user_id, &slot);
                }
                return Err(IntakeError::Cancelled);
            }
            if guard.retired {
                continue;
            }
            let generation = guard.buffer.push(event, Instant::now(), self.inner.window);
            let deadline = guard.buffer.deadline().unwrap_or_else(Instant::now);
            let buffered = guard.buffer.len();
            drop(guard);

            trace!(user_id = %user_id, generation, buffered, "event buffered");
            self.arm_timer(user_id, slot, generation, deadline);
            return Ok(());
        }
    }

    fn arm_timer(&self, user_id: String, slot: SharedSlot, generation: u64, deadline: Instant) {
        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }

            let events = {
                let mut guard = slot.lock().await;
                if guard.buffer.generation() != generation {
                    trace!(user_id = %user_id, generation, "stale timer");
                    return;
                }
                guard.buffer.detach()
            };

            inner.process(&user_id, events).await;
            inner.prune(&user_id);
        });
    }

    /// Stop accepting events, then flush or drop what is buffered, cancel
    /// outstanding work and wait for in-flight flushes to finish.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.inner.closing.store(true, Ordering::SeqCst);

        let slots: Vec<(String, SharedSlot)> = self.inner.registry().drain().collect();
        let mut pending = Vec::new();
        for (user_id, slot) in slots {
            let mut guard = slot.lock().await;
            guard.retired = true;
            let events = guard.buffer.detach();
            if !events.is_empty() {
                pending.push((user_id, events));
            }
        }

        match mode {
            ShutdownMode::Flush => {
                info!(users = pending.len(), "flushing pending threads on shutdown");
                let mut flushes = JoinSet::new();
                for (user_id, events) in pending {
                    let inner = Arc::clone(&self.inner);
                    flushes.spawn(async move { inner.process(&user_id, events).await });
                }
                while let Some(joined) = flushes.join_next().await {
                    if let Err(e) = joined {
                        error!(error = %e, "shutdown flush task failed");
                    }
                }
            }
            ShutdownMode::Drop => {
                if !pending.is_empty() {
                    warn!(users = pending.len(), "dropping pending threads on shutdown");
                }
            }
        }

        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("thread coordinator stopped");
    }
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Remove `slot` from the registry if it is still the user's current one.
    fn forget(&self, user_id: &str, slot: &SharedSlot) {
        let mut slots = self.registry();
        if slots.get(user_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(user_id);
        }
    }

    fn slot(&self, user_id: &str) -> SharedSlot {
        let mut slots = self.registry();
        Arc::clone(
            slots
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(UserSlot::default()))),
        )
    }

    async fn process(&self, user_id: &str, events: Vec<RawMessageEvent>) {
        let Some(intent) = MergedIntent::merge(user_id, &events) else {
            return;
        };
        debug!(user_id, events = intent.event_count, "flushing thread");
        if let Err(e) = self.handler.handle(intent).await {
            warn!(user_id, error = %e, "thread flush failed; buffer discarded");
            // Nobody listening is fine.
            let _ = self.failures.send(ThreadFlushError {
                user_id: user_id.to_owned(),
                reason: format!("{e:#}"),
            });
        }
    }

    /// Drop the user's slot if nothing is buffered and nobody holds it.
    fn prune(&self, user_id: &str) {
        let mut slots = self.registry();
        let idle = match slots.get(user_id).map(|slot| slot.try_lock()) {
            Some(Ok(mut guard)) if guard.buffer.is_idle() => {
                guard.retired = true;
                true
            }
            _ => false,
        };
        if idle {
            slots.remove(user_id);
            trace!(user_id, "idle slot pruned");
        }
    }
}
