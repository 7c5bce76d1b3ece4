//! Unmute action sequence
//!
//! Runs the best-effort side effects that end a mute: reinvite (or timeout
//! removal), direct notification, then record removal. Each step records its
//! own outcome and never aborts the steps after it; the record is always
//! removed last.
//!
//! Every change to a key's mute state happens under that key's lock, taken
//! here by sequences and by [`crate::moderation::MuteService::mute`].

use crate::moderation::{
    GuildSession, ModerationStore, MuteKey, MuteMode, MuteRecord, MuteSettings, SequenceStatus,
    StepOutcome, UnmuteReport, UnmuteTrigger,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Something that can end a mute. The scheduler fires through this seam
/// with the deadline the timer was armed for.
#[async_trait::async_trait]
pub trait UnmuteAction: Send + Sync {
    async fn fire(&self, key: MuteKey, deadline: i64) -> UnmuteReport;
}

/// Removes a key from the in-flight set when a sequence ends or is dropped
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<MuteKey, UnmuteTrigger>,
    key: MuteKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

/// Exclusive hold on one key's mute state
pub struct KeyGuard<'a> {
    locks: &'a DashMap<MuteKey, Arc<Mutex<()>>>,
    key: MuteKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Nobody holds or waits on the lock any more
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Executes unmute sequences against a [`GuildSession`]
pub struct UnmuteSequencer {
    store: ModerationStore,
    session: Arc<dyn GuildSession>,
    settings: MuteSettings,
    /// Keys with a sequence currently running
    in_flight: DashMap<MuteKey, UnmuteTrigger>,
    key_locks: DashMap<MuteKey, Arc<Mutex<()>>>,
}

impl UnmuteSequencer {
    pub fn new(store: ModerationStore, session: Arc<dyn GuildSession>, settings: MuteSettings) -> Self {
        Self {
            store,
            session,
            settings,
            in_flight: DashMap::new(),
            key_locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`'s mute state
    pub async fn lock_key(&self, key: MuteKey) -> KeyGuard<'_> {
        let lock = Arc::clone(self.key_locks.entry(key).or_default().value());
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: &self.key_locks,
            key,
            guard: Some(guard),
        }
    }

    /// Run the sequence for `key`.
    ///
    /// A second call for a key whose sequence is still running returns an
    /// `AlreadyRunning` report instead of running twice.
    pub async fn run(&self, key: MuteKey, trigger: UnmuteTrigger) -> UnmuteReport {
        self.execute(key, trigger, None).await
    }

    /// `deadline` is set for timer expiries: a record whose deadline no
    /// longer matches belongs to a newer mute and is left untouched.
    async fn execute(&self, key: MuteKey, trigger: UnmuteTrigger, deadline: Option<i64>) -> UnmuteReport {
        match self.in_flight.entry(key) {
            Entry::Occupied(running) => {
                debug!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    running = %running.get(),
                    trigger = %trigger,
                    "Unmute already in progress, skipping"
                );
                return UnmuteReport::not_run(key, trigger, SequenceStatus::AlreadyRunning);
            }
            Entry::Vacant(slot) => {
                slot.insert(trigger);
            }
        }
        let _in_flight = InFlightGuard {
            in_flight: &self.in_flight,
            key,
        };
        let _key = self.lock_key(key).await;

        let mut report = UnmuteReport::new(key, trigger);
        let Some(record) = self.store.get(key.guild_id, key.user_id).await else {
            debug!(guild_id = key.guild_id, user_id = key.user_id, trigger = %trigger, "No mute record, nothing to undo");
            return report;
        };
        report.record_found = true;

        if let Some(deadline) = deadline.filter(|&d| d != record.unmute_at) {
            debug!(
                guild_id = key.guild_id,
                user_id = key.user_id,
                deadline,
                unmute_at = record.unmute_at,
                "Expiry superseded by a newer mute"
            );
            report.status = SequenceStatus::Superseded;
            return report;
        }

        if trigger != UnmuteTrigger::Rejoined {
            match self.settings.mode {
                MuteMode::Exclusion => {
                    let (outcome, url) = self.reinvite(&record).await;
                    report.invite = outcome;
                    report.invite_url = url;
                }
                MuteMode::Timeout => {
                    report.restriction = self.lift_restriction(key).await;
                }
            }
            report.notification = self.notify(key, trigger, report.invite_url.as_deref()).await;
        }

        report.removal = match self.store.remove_matching(&record).await {
            Ok(true) => StepOutcome::Done,
            Ok(false) => StepOutcome::Skipped,
            Err(e) => StepOutcome::Failed(e.to_string()),
        };

        info!(
            guild_id = key.guild_id,
            user_id = key.user_id,
            trigger = %trigger,
            invite = ?report.invite,
            restriction = ?report.restriction,
            notification = ?report.notification,
            removal = ?report.removal,
            "Unmute sequence completed"
        );
        report
    }

    /// Pick the channel hosting the reinvite: the one recorded at mute time
    /// if it still exists, then the guild default, then any invitable one.
    async fn resolve_channel(&self, record: &MuteRecord) -> Option<u64> {
        if let Some(channel_id) = record.rejoin_channel_id {
            if self.session.channel_in_guild(record.guild_id, channel_id).await {
                return Some(channel_id);
            }
        }
        if let Some(channel_id) = self.session.resolve_default_channel(record.guild_id).await {
            return Some(channel_id);
        }
        self.session.first_invitable_channel(record.guild_id).await
    }

    async fn reinvite(&self, record: &MuteRecord) -> (StepOutcome, Option<String>) {
        let Some(channel_id) = self.resolve_channel(record).await else {
            debug!(guild_id = record.guild_id, "No channel available for a reinvite");
            return (StepOutcome::Skipped, None);
        };

        if !self.session.has_invite_capability(record.guild_id, channel_id).await {
            debug!(
                guild_id = record.guild_id,
                channel_id,
                "Missing invite permission on reinvite channel"
            );
            return (StepOutcome::Skipped, None);
        }

        match self
            .session
            .create_invite(channel_id, self.settings.unmute_invite_max_age_secs, 1)
            .await
        {
            Ok(url) => (StepOutcome::Done, Some(url)),
            Err(e) => {
                warn!(
                    guild_id = record.guild_id,
                    user_id = record.user_id,
                    channel_id,
                    step = "invite",
                    error = %e,
                    "Could not create reinvite"
                );
                (StepOutcome::Failed(e.to_string()), None)
            }
        }
    }

    async fn lift_restriction(&self, key: MuteKey) -> StepOutcome {
        match self.session.lift_timeout(key.guild_id, key.user_id).await {
            Ok(()) => StepOutcome::Done,
            Err(e) => {
                warn!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    step = "lift_timeout",
                    error = %e,
                    "Could not lift timeout"
                );
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn notify(&self, key: MuteKey, trigger: UnmuteTrigger, invite_url: Option<&str>) -> StepOutcome {
        let guild_name = self
            .session
            .guild_name(key.guild_id)
            .await
            .unwrap_or_else(|| "the server".to_string());
        let text = unmute_notice(trigger, &guild_name, invite_url);

        match self.session.send_direct_message(key.user_id, text).await {
            Ok(()) => StepOutcome::Done,
            Err(e) => {
                warn!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    step = "notify",
                    error = %e,
                    "Could not DM user on unmute"
                );
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl UnmuteAction for UnmuteSequencer {
    async fn fire(&self, key: MuteKey, deadline: i64) -> UnmuteReport {
        self.execute(key, UnmuteTrigger::Expired, Some(deadline)).await
    }
}

/// Direct message sent when a mute ends
fn unmute_notice(trigger: UnmuteTrigger, guild_name: &str, invite_url: Option<&str>) -> String {
    let headline = match trigger {
        UnmuteTrigger::Manual => format!("✅ You have been unmuted on **{guild_name}**."),
        UnmuteTrigger::Expired | UnmuteTrigger::Rejoined => {
            format!("🔔 Your mute on **{guild_name}** has ended.")
        }
    };
    match invite_url {
        Some(url) => format!("{headline} Here is your link to come back: {url}"),
        None => headline,
    }
}
