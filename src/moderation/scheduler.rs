//! Unmute scheduler
//!
//! In-memory registry of armed unmute timers, at most one per key. Timers are
//! not persisted: after a restart they are rebuilt from the store's records
//! with [`UnmuteScheduler::rehydrate_all`].

use crate::moderation::{Clock, MuteKey, MuteRecord, UnmuteAction};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of arming a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A timer is now waiting for the deadline
    Scheduled { fire_at: i64 },
    /// The deadline had already passed; the unmute ran immediately
    FiredImmediately,
}

/// Counts reported by [`UnmuteScheduler::rehydrate_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RehydrateSummary {
    pub armed: usize,
    pub fired: usize,
}

/// A live countdown for one key
#[derive(Debug)]
struct ScheduledTimer {
    /// Distinguishes this arming from any later one for the same key
    id: Uuid,
    fire_at: i64,
    handle: AbortHandle,
}

/// Arms, replaces and cancels unmute timers
#[derive(Clone)]
pub struct UnmuteScheduler {
    timers: Arc<DashMap<MuteKey, ScheduledTimer>>,
    clock: Arc<dyn Clock>,
    action: Arc<dyn UnmuteAction>,
}

impl UnmuteScheduler {
    pub fn new(clock: Arc<dyn Clock>, action: Arc<dyn UnmuteAction>) -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            clock,
            action,
        }
    }

    /// Arm the timer for `key`, replacing any existing one.
    ///
    /// A deadline at or before now fires right away instead of scheduling.
    pub async fn arm(&self, key: MuteKey, unmute_at: i64) -> ArmOutcome {
        self.cancel(key);

        let wait = u64::try_from(unmute_at.saturating_sub(self.clock.now())).unwrap_or(0);
        if wait == 0 {
            info!(guild_id = key.guild_id, user_id = key.user_id, "Mute already due, unmuting now");
            self.action.fire(key, unmute_at).await;
            return ArmOutcome::FiredImmediately;
        }

        let id = Uuid::new_v4();
        let deadline = Instant::now() + Duration::from_secs(wait);
        let timers = Arc::clone(&self.timers);
        let action = Arc::clone(&self.action);

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            // Only the current arming may fire. Once the entry is gone a late
            // cancel finds nothing, so the sequence below is never interrupted.
            if timers.remove_if(&key, |_, timer| timer.id == id).is_none() {
                return;
            }
            debug!(guild_id = key.guild_id, user_id = key.user_id, "Unmute timer fired");
            action.fire(key, unmute_at).await;
        });

        let timer = ScheduledTimer {
            id,
            fire_at: unmute_at,
            handle: task.abort_handle(),
        };
        if let Some(previous) = self.timers.insert(key, timer) {
            // Armed concurrently between our cancel and insert
            previous.handle.abort();
        }

        debug!(
            guild_id = key.guild_id,
            user_id = key.user_id,
            fire_at = unmute_at,
            wait_secs = wait,
            "Unmute timer armed"
        );
        ArmOutcome::Scheduled { fire_at: unmute_at }
    }

    /// Cancel the pending timer for `key`. Returns whether one was armed.
    ///
    /// A fire that has already started is not interrupted.
    pub fn cancel(&self, key: MuteKey) -> bool {
        match self.timers.remove(&key) {
            Some((_, timer)) => {
                timer.handle.abort();
                debug!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    fire_at = timer.fire_at,
                    "Unmute timer cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Deadline of the armed timer for `key`, if any
    #[must_use]
    pub fn pending(&self, key: MuteKey) -> Option<i64> {
        self.timers.get(&key).map(|timer| timer.fire_at)
    }

    /// Number of armed timers
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }

    /// Rebuild timers from stored records. Future deadlines are armed;
    /// overdue ones fire immediately rather than being dropped.
    pub async fn rehydrate_all(&self, records: Vec<MuteRecord>) -> RehydrateSummary {
        let mut summary = RehydrateSummary::default();
        for record in records {
            match self.arm(record.key(), record.unmute_at).await {
                ArmOutcome::Scheduled { .. } => summary.armed += 1,
                ArmOutcome::FiredImmediately => summary.fired += 1,
            }
        }
        info!(
            armed = summary.armed,
            fired = summary.fired,
            "Rehydrated unmute timers"
        );
        summary
    }
}
