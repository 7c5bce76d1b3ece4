//! Bot configuration
//!
//! Read once at startup from an optional YAML file, then overridden by
//! environment variables. Only the token is mandatory.

use crate::moderation::{MuteMode, MuteSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the YAML config file
pub const DEFAULT_CONFIG_FILE: &str = "config/bot.yaml";

const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";
const CONFIG_VAR: &str = "HOSHIKUZU_CONFIG";
const PREFIX_VAR: &str = "HOSHIKUZU_PREFIX";
const DATA_FILE_VAR: &str = "HOSHIKUZU_DATA_FILE";
const LOG_DIR_VAR: &str = "HOSHIKUZU_LOG_DIR";
const MUTE_MODE_VAR: &str = "HOSHIKUZU_MUTE_MODE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DISCORD_BOT_TOKEN must be set")]
    MissingToken,
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// Runtime configuration of the bot
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Never read from the file; the token only comes from the environment
    #[serde(skip)]
    pub token: String,
    /// File the settings were read from, `None` when no file exists
    #[serde(skip)]
    pub source: Option<PathBuf>,
    pub prefix: String,
    pub data_file: PathBuf,
    pub log_dir: PathBuf,
    pub mute_mode: MuteMode,
    pub unmute_invite_max_age_secs: u32,
    pub mute_invite_grace_secs: u32,
    pub max_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        let settings = MuteSettings::default();
        Self {
            token: String::new(),
            source: None,
            prefix: "+".to_string(),
            data_file: PathBuf::from("data/moderation.json"),
            log_dir: PathBuf::from("logs"),
            mute_mode: settings.mode,
            unmute_invite_max_age_secs: settings.unmute_invite_max_age_secs,
            mute_invite_grace_secs: settings.mute_invite_grace_secs,
            max_timeout_secs: settings.max_timeout_secs,
        }
    }
}

// Keep the token out of logs
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .field("prefix", &self.prefix)
            .field("data_file", &self.data_file)
            .field("log_dir", &self.log_dir)
            .field("mute_mode", &self.mute_mode)
            .field("unmute_invite_max_age_secs", &self.unmute_invite_max_age_secs)
            .field("mute_invite_grace_secs", &self.mute_invite_grace_secs)
            .field("max_timeout_secs", &self.max_timeout_secs)
            .finish()
    }
}

impl BotConfig {
    /// Load the config file named by `HOSHIKUZU_CONFIG` (or the default
    /// path) and apply environment overrides.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read or parsed, when an
    /// override is invalid, or when no token is set.
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_VAR)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
        let file = Self::read_file(&path).await?;
        Self::from_sources(file.as_deref(), &path, |name| std::env::var(name).ok())
    }

    /// `None` when the file does not exist
    async fn read_file(path: &Path) -> Result<Option<String>, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Build a config from file content and an environment lookup
    fn from_sources(
        file: Option<&str>,
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match file.filter(|content| !content.trim().is_empty()) {
            Some(content) => {
                serde_yaml::from_str::<Self>(content).map_err(|source| ConfigError::Malformed {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.source = file.map(|_| path.to_path_buf());

        if let Some(prefix) = env(PREFIX_VAR) {
            config.prefix = prefix;
        }
        if let Some(data_file) = env(DATA_FILE_VAR) {
            config.data_file = PathBuf::from(data_file);
        }
        if let Some(log_dir) = env(LOG_DIR_VAR) {
            config.log_dir = PathBuf::from(log_dir);
        }
        if let Some(mode) = env(MUTE_MODE_VAR) {
            config.mute_mode = mode.parse().map_err(|message| ConfigError::InvalidValue {
                name: MUTE_MODE_VAR,
                message,
            })?;
        }
        if config.prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "prefix",
                message: "must not be empty".to_string(),
            });
        }

        config.token = env(TOKEN_VAR)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)?;
        Ok(config)
    }

    /// Where the settings came from. Logged once logging is up, since the
    /// config is read before the subscriber exists.
    #[must_use]
    pub fn source_description(&self) -> String {
        match &self.source {
            Some(path) => format!("config file {}", path.display()),
            None => "defaults and environment".to_string(),
        }
    }

    /// The subset of the config the moderation core needs
    #[must_use]
    pub fn mute_settings(&self) -> MuteSettings {
        MuteSettings {
            mode: self.mute_mode,
            unmute_invite_max_age_secs: self.unmute_invite_max_age_secs,
            mute_invite_grace_secs: self.mute_invite_grace_secs,
            max_timeout_secs: self.max_timeout_secs,
        }
    }
}
