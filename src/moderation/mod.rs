//! Moderation core
//!
//! Temporary mutes with persisted deadlines, their timers and the unmute
//! sequence, plus the warning log. Platform access goes through
//! [`GuildSession`].

mod clock;
mod duration;
mod error;
mod record;
mod scheduler;
mod sequencer;
mod service;
mod session;
mod store;

pub use clock::{Clock, SystemClock};
pub use duration::parse_duration;
pub use error::{ErrorKind, ModerationError, ModerationResult, SessionError};
pub use record::{
    MuteKey, MuteRecord, SequenceStatus, StepOutcome, UnmuteReport, UnmuteTrigger, WarnEntry,
};
pub use scheduler::{ArmOutcome, RehydrateSummary, UnmuteScheduler};
pub use sequencer::{KeyGuard, UnmuteAction, UnmuteSequencer};
pub use service::{MuteOutcome, MuteService};
#[cfg(test)]
pub use session::MockGuildSession;
pub(crate) use session::is_not_found;
pub use session::{GuildSession, MemberStatus, SerenitySession, SessionResult};
pub use store::ModerationStore;

use serde::{Deserialize, Serialize};

/// How a mute keeps the user out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum MuteMode {
    /// Kick the user, then send a single-use invite when the mute ends
    #[default]
    #[display("exclusion")]
    Exclusion,
    /// Use the platform's native timeout
    #[display("timeout")]
    Timeout,
}

impl std::str::FromStr for MuteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclusion" | "kick" => Ok(Self::Exclusion),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown mute mode: {other}")),
        }
    }
}

/// Tunables for mutes and unmutes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteSettings {
    pub mode: MuteMode,
    /// Lifetime of the invite sent when a mute ends
    pub unmute_invite_max_age_secs: u32,
    /// Extra lifetime of the invite created at mute time
    pub mute_invite_grace_secs: u32,
    /// Longest mute accepted in timeout mode
    pub max_timeout_secs: u64,
}

impl Default for MuteSettings {
    fn default() -> Self {
        Self {
            mode: MuteMode::Exclusion,
            unmute_invite_max_age_secs: 24 * 3_600,
            mute_invite_grace_secs: 60,
            max_timeout_secs: 28 * 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mute_mode_parsing() {
        assert_eq!("timeout".parse::<MuteMode>(), Ok(MuteMode::Timeout));
        assert_eq!(" Exclusion ".parse::<MuteMode>(), Ok(MuteMode::Exclusion));
        assert!("mute".parse::<MuteMode>().is_err());
        assert_eq!(MuteMode::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_default_settings() {
        let settings = MuteSettings::default();
        assert_eq!(settings.mode, MuteMode::Exclusion);
        assert_eq!(settings.unmute_invite_max_age_secs, 86_400);
        assert_eq!(settings.max_timeout_secs, 2_419_200);
    }
}
