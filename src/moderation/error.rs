//! Error types for the moderation subsystem
//!
//! Every failure a mute, unmute or warn operation can report to the invoking
//! moderator lives here, together with the coarse taxonomy used to decide how
//! it is reported and whether it is logged as a fault.

use thiserror::Error;

/// Coarse classification of a [`ModerationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ErrorKind {
    /// Bad duration, bad index, missing argument
    #[display("invalid input")]
    InvalidInput,
    /// The target user does not exist
    #[display("target not found")]
    TargetNotFound,
    /// The target exists but the operation does not apply to them
    #[display("not eligible")]
    NotEligible,
    /// The chat platform refused a call
    #[display("platform rejected")]
    PlatformRejected,
    /// The backing file could not be read or written
    #[display("persistence degraded")]
    PersistenceDegraded,
}

/// Error raised by the platform seam. Platform failures are flattened to a
/// single message; the core only ever needs ok/fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SessionError(pub String);

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<poise::serenity_prelude::Error> for SessionError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self(error.to_string())
    }
}

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Duration text did not parse
    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),

    /// Duration parsed but exceeds what the deployment allows
    #[error("Duration of {seconds}s exceeds the maximum of {max}s")]
    DurationTooLong { seconds: u64, max: u64 },

    /// The target user does not exist on the platform
    #[error("User not found: {0}")]
    TargetNotFound(u64),

    /// The target user is not a member of the guild
    #[error("User {0} is not a member of the guild")]
    NotMember(u64),

    /// There is no mute record for the target
    #[error("User {0} is not muted")]
    NotMuted(u64),

    /// No warning at the requested 1-based index
    #[error("No warning #{index} for user {user_id}")]
    WarningNotFound { user_id: u64, index: usize },

    /// The chat platform refused the call
    #[error("Platform rejected request: {0}")]
    PlatformRejected(#[from] SessionError),

    /// The store file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<std::io::Error> for ModerationError {
    fn from(error: std::io::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for ModerationError {
    fn from(error: serde_json::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl ModerationError {
    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDuration(_) | Self::DurationTooLong { .. } | Self::WarningNotFound { .. } => {
                ErrorKind::InvalidInput
            }
            Self::TargetNotFound(_) => ErrorKind::TargetNotFound,
            Self::NotMember(_) | Self::NotMuted(_) => ErrorKind::NotEligible,
            Self::PlatformRejected(_) => ErrorKind::PlatformRejected,
            Self::Persistence(_) => ErrorKind::PersistenceDegraded,
        }
    }

    /// Text shown to the moderator who invoked the command.
    ///
    /// Platform failures get a generic message; their cause goes to the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidDuration(_) => "Invalid duration. Examples: 30s, 10m, 1h, 2d".to_string(),
            Self::DurationTooLong { max, .. } => {
                format!("That duration is too long (maximum is {} days).", max / 86_400)
            }
            Self::TargetNotFound(_) => "User not found. Use a mention or a valid ID.".to_string(),
            Self::NotMember(_) => "That user is not a member of this server.".to_string(),
            Self::NotMuted(_) => "That user is not recorded as muted.".to_string(),
            Self::WarningNotFound { index, .. } => format!("There is no warning #{index}."),
            Self::PlatformRejected(_) => "Unable to perform that action on this user.".to_string(),
            Self::Persistence(_) => "Moderation data could not be saved.".to_string(),
        }
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
