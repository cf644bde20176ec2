//! Delayed, cancellable respawn timers.
//!
//! The [`RespawnScheduler`] holds at most one pending task per entity. Each
//! task is backed by a tokio timer that does nothing but post a
//! [`TimerFired`] message back to the owner when it elapses. The owner then
//! calls [`take_fired`](RespawnScheduler::take_fired), which removes the
//! slot before handing out the payload. A slot is therefore always released
//! exactly once, whether the task fires, is cancelled, or is replaced.
//!
//! Every scheduling bumps a generation counter. A fired message whose
//! generation no longer matches the slot belongs to a replaced or cancelled
//! task and is ignored.

use std::collections::HashMap;
use std::time::Duration;

use respawn_types::EntityId;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Upper bound on a single delay, keeping deadline arithmetic in range.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Message a timer posts to the scheduler's owner when it elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// The entity whose timer elapsed.
    pub entity_id: EntityId,
    /// Generation of the task the timer belonged to.
    pub generation: u64,
}

/// Read-only view of a pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    /// The entity the task respawns.
    pub entity_id: EntityId,
    /// When the task fires.
    pub fire_at: Instant,
    /// How many times a task has been scheduled for this entity without
    /// the slot being released in between. Starts at 1.
    pub attempt: u32,
}

/// Returned by [`RespawnScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleHandle {
    /// The scheduled task.
    pub task: ScheduledTask,
    /// Generation the timer will report.
    pub generation: u64,
    /// Whether an existing task for the same entity was replaced.
    pub replaced: bool,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    task: ScheduledTask,
    timer: AbortHandle,
    payload: T,
}

/// Registry of pending respawn timers, one per entity.
///
/// Not thread-safe by itself: it is owned by a single task, which also
/// drains the [`TimerFired`] receiver returned by [`new`](Self::new).
#[derive(Debug)]
pub struct RespawnScheduler<T> {
    slots: HashMap<EntityId, Slot<T>>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl<T> RespawnScheduler<T> {
    /// Create an empty scheduler and the receiver its timers post to.
    ///
    /// Must be called from within a tokio runtime before any scheduling.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            slots: HashMap::new(),
            next_generation: 0,
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Schedule `payload` for `entity_id` after `delay`, replacing any task
    /// already pending for that entity.
    pub fn schedule(&mut self, entity_id: EntityId, delay: Duration, payload: T) -> ScheduleHandle {
        let previous = self.slots.remove(&entity_id);
        let replaced = previous.is_some();
        let attempt = previous.map_or(1, |slot| {
            slot.timer.abort();
            slot.task.attempt.saturating_add(1)
        });

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let now = Instant::now();
        let fire_at = now.checked_add(delay.min(MAX_DELAY)).unwrap_or(now);
        let task = ScheduledTask {
            entity_id,
            fire_at,
            attempt,
        };

        let fired_tx = self.fired_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            // The owner may already be gone during shutdown.
            let _ = fired_tx.send(TimerFired {
                entity_id,
                generation,
            });
        })
        .abort_handle();

        tracing::debug!(
            entity_id = %entity_id,
            delay_ms = delay.as_millis(),
            attempt,
            replaced,
            "Respawn task scheduled"
        );

        self.slots.insert(
            entity_id,
            Slot {
                generation,
                task,
                timer,
                payload,
            },
        );

        ScheduleHandle {
            task,
            generation,
            replaced,
        }
    }

    /// Cancel the pending task for `entity_id`. Returns whether one existed.
    pub fn cancel(&mut self, entity_id: EntityId) -> bool {
        self.slots.remove(&entity_id).is_some_and(|slot| {
            slot.timer.abort();
            tracing::debug!(entity_id = %entity_id, "Respawn task cancelled");
            true
        })
    }

    /// Release the slot a fired timer belongs to and return its task and
    /// payload. Returns `None` for stale generations.
    pub fn take_fired(&mut self, fired: TimerFired) -> Option<(ScheduledTask, T)> {
        let current = self.slots.get(&fired.entity_id)?;
        if current.generation != fired.generation {
            tracing::trace!(
                entity_id = %fired.entity_id,
                generation = fired.generation,
                "Ignoring stale timer"
            );
            return None;
        }
        self.slots
            .remove(&fired.entity_id)
            .map(|slot| (slot.task, slot.payload))
    }

    /// The pending task for `entity_id`, if any.
    pub fn pending(&self, entity_id: EntityId) -> Option<ScheduledTask> {
        self.slots.get(&entity_id).map(|slot| slot.task)
    }

    /// All pending tasks, earliest first.
    pub fn pending_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.slots.values().map(|slot| slot.task).collect();
        tasks.sort_by_key(|task| (task.fire_at, task.entity_id));
        tasks
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cancel every pending task. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.slots.len();
        for (_, slot) in self.slots.drain() {
            slot.timer.abort();
        }
        count
    }
}

impl<T> Drop for RespawnScheduler<T> {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            slot.timer.abort();
        }
    }
}
