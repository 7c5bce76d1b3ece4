//! Mute and warning records
//!
//! This module defines the records kept by the moderation store and the
//! outcome types reported by an unmute sequence.

use serde::{Deserialize, Serialize};

/// Identifies one muted user in one guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{guild_id}-{user_id}")]
pub struct MuteKey {
    pub guild_id: u64,
    pub user_id: u64,
}

impl MuteKey {
    #[must_use]
    pub const fn new(guild_id: u64, user_id: u64) -> Self {
        Self { guild_id, user_id }
    }
}

/// A user currently excluded from a guild, waiting for their unmute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteRecord {
    pub guild_id: u64,
    pub user_id: u64,
    /// Unix timestamp (seconds) at which the mute ends
    pub unmute_at: i64,
    /// Channel chosen at mute time to host a reinvite
    pub rejoin_channel_id: Option<u64>,
    /// Invite created at mute time; a fresh one may be made at unmute
    pub invite_url: Option<String>,
}

impl MuteRecord {
    #[must_use]
    pub fn key(&self) -> MuteKey {
        MuteKey::new(self.guild_id, self.user_id)
    }

    /// Whether the deadline is at or before `now`
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        self.unmute_at <= now
    }
}

/// One entry of a user's warning log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnEntry {
    #[serde(rename = "issuer")]
    pub issuer_id: u64,
    pub reason: String,
    #[serde(rename = "date")]
    pub timestamp: String,
}

impl WarnEntry {
    /// Create an entry stamped with the current UTC time
    pub fn now(issuer_id: u64, reason: impl Into<String>) -> Self {
        Self {
            issuer_id,
            reason: reason.into(),
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

/// What started an unmute sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum UnmuteTrigger {
    /// The scheduled deadline passed
    #[display("expired")]
    Expired,
    /// A moderator lifted the mute
    #[display("manual")]
    Manual,
    /// The user came back to the guild before the deadline
    #[display("rejoined")]
    Rejoined,
}

/// Result of one best-effort step of an unmute sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped,
    Failed(String),
}

impl StepOutcome {
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Whether an unmute sequence actually ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SequenceStatus {
    /// The steps ran (or there was no record to act on)
    #[display("ran")]
    Ran,
    /// Another sequence for the same key was already running
    #[display("already running")]
    AlreadyRunning,
    /// The expiry was for a deadline a newer mute replaced
    #[display("superseded")]
    Superseded,
}

/// Per-step record of what an unmute sequence did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmuteReport {
    pub key: MuteKey,
    pub trigger: UnmuteTrigger,
    pub status: SequenceStatus,
    /// A MuteRecord existed when the sequence started
    pub record_found: bool,
    /// Reinvite creation (exclusion mode)
    pub invite: StepOutcome,
    /// Timeout removal (timeout mode)
    pub restriction: StepOutcome,
    /// Direct message to the user
    pub notification: StepOutcome,
    /// The invite URL sent, if any
    pub invite_url: Option<String>,
    /// `Failed` means the record left memory but the file still holds it
    pub removal: StepOutcome,
}

impl UnmuteReport {
    /// A report with every step still skipped
    #[must_use]
    pub fn new(key: MuteKey, trigger: UnmuteTrigger) -> Self {
        Self {
            key,
            trigger,
            status: SequenceStatus::Ran,
            record_found: false,
            invite: StepOutcome::Skipped,
            restriction: StepOutcome::Skipped,
            notification: StepOutcome::Skipped,
            invite_url: None,
            removal: StepOutcome::Skipped,
        }
    }

    /// A report for a sequence that did not run at all
    #[must_use]
    pub fn not_run(key: MuteKey, trigger: UnmuteTrigger, status: SequenceStatus) -> Self {
        Self {
            status,
            ..Self::new(key, trigger)
        }
    }

    /// The record is gone from the live store, whether or not the file caught up
    #[must_use]
    pub fn record_removed(&self) -> bool {
        !matches!(self.removal, StepOutcome::Skipped)
    }
}
