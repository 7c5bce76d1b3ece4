//! Moderation store
//!
//! Durable home of mute records and warning logs. The whole store is one JSON
//! document rewritten on every mutation; a single async mutex guards the
//! read-modify-write-persist cycle so interleaved commands never interleave
//! partial writes.

use crate::moderation::{ModerationError, ModerationResult, MuteKey, MuteRecord, WarnEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// On-disk shape of one mute record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMute {
    #[serde(default)]
    unmute_ts: i64,
    #[serde(default)]
    channel: Option<u64>,
    #[serde(default)]
    invite: Option<String>,
}

/// On-disk document, keyed by guild id then user id (as strings)
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    mutes: BTreeMap<String, BTreeMap<String, StoredMute>>,
    #[serde(default)]
    warns: BTreeMap<String, BTreeMap<String, Vec<WarnEntry>>>,
}

/// In-memory state
#[derive(Debug, Default)]
struct StoreState {
    mutes: BTreeMap<MuteKey, MuteRecord>,
    warns: BTreeMap<MuteKey, Vec<WarnEntry>>,
}

impl StoreState {
    fn from_document(document: StoreDocument) -> Self {
        let mut state = Self::default();

        for (guild, users) in document.mutes {
            for (user, stored) in users {
                let Some(key) = parse_key(&guild, &user) else {
                    warn!("Skipping mute record with invalid key {guild}/{user}");
                    continue;
                };
                state.mutes.insert(
                    key,
                    MuteRecord {
                        guild_id: key.guild_id,
                        user_id: key.user_id,
                        unmute_at: stored.unmute_ts,
                        rejoin_channel_id: stored.channel,
                        invite_url: stored.invite,
                    },
                );
            }
        }

        for (guild, users) in document.warns {
            for (user, entries) in users {
                let Some(key) = parse_key(&guild, &user) else {
                    warn!("Skipping warnings with invalid key {guild}/{user}");
                    continue;
                };
                state.warns.insert(key, entries);
            }
        }

        state
    }

    fn to_document(&self) -> StoreDocument {
        let mut document = StoreDocument::default();

        for (key, record) in &self.mutes {
            document
                .mutes
                .entry(key.guild_id.to_string())
                .or_default()
                .insert(
                    key.user_id.to_string(),
                    StoredMute {
                        unmute_ts: record.unmute_at,
                        channel: record.rejoin_channel_id,
                        invite: record.invite_url.clone(),
                    },
                );
        }

        for (key, entries) in &self.warns {
            document
                .warns
                .entry(key.guild_id.to_string())
                .or_default()
                .insert(key.user_id.to_string(), entries.clone());
        }

        document
    }
}

fn parse_key(guild: &str, user: &str) -> Option<MuteKey> {
    Some(MuteKey::new(guild.parse().ok()?, user.parse().ok()?))
}

struct StoreInner {
    /// `None` keeps the store purely in memory
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

/// Store for mute records and warning logs
#[derive(Clone)]
pub struct ModerationStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for ModerationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl ModerationStore {
    /// Open the store backed by `path`.
    ///
    /// A missing file yields an empty store. An unreadable or malformed file
    /// also yields an empty store, with an error logged; startup never fails
    /// because of the store.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<StoreDocument>(&content) {
                Ok(document) => {
                    let state = StoreState::from_document(document);
                    info!(
                        "Loaded moderation store from {} ({} mutes, {} warning logs)",
                        path.display(),
                        state.mutes.len(),
                        state.warns.len()
                    );
                    state
                }
                Err(e) => {
                    error!("Moderation store {} is malformed, starting empty: {e}", path.display());
                    StoreState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No moderation store at {}, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => {
                error!("Could not read moderation store {}, starting empty: {e}", path.display());
                StoreState::default()
            }
        };

        Self {
            inner: Arc::new(StoreInner {
                path: Some(path),
                state: Mutex::new(state),
            }),
        }
    }

    /// A store that never touches the disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: None,
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    /// Path of the backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Insert or replace the mute record for its key, then persist.
    ///
    /// The in-memory record is updated even when the write fails.
    ///
    /// # Errors
    /// Returns `ModerationError::Persistence` if the document could not be written.
    pub async fn put(&self, record: MuteRecord) -> ModerationResult<()> {
        let mut state = self.inner.state.lock().await;
        if let Some(previous) = state.mutes.insert(record.key(), record) {
            debug!("Replaced mute record for {}", previous.key());
        }
        self.persist(&state).await
    }

    /// Get the mute record for a user
    pub async fn get(&self, guild_id: u64, user_id: u64) -> Option<MuteRecord> {
        let state = self.inner.state.lock().await;
        state.mutes.get(&MuteKey::new(guild_id, user_id)).cloned()
    }

    /// Delete the mute record for a user. Returns whether one existed.
    ///
    /// Removing an absent record is a no-op and does not rewrite the file.
    ///
    /// # Errors
    /// Returns `ModerationError::Persistence` if the document could not be written.
    pub async fn remove(&self, guild_id: u64, user_id: u64) -> ModerationResult<bool> {
        let mut state = self.inner.state.lock().await;
        if state.mutes.remove(&MuteKey::new(guild_id, user_id)).is_none() {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    /// Delete the mute record for `expected`'s key only if it still carries
    /// the same deadline. A record replaced by a newer mute is left alone.
    ///
    /// # Errors
    /// Returns `ModerationError::Persistence` if the document could not be
    /// written; the record is already gone from memory at that point.
    pub async fn remove_matching(&self, expected: &MuteRecord) -> ModerationResult<bool> {
        let key = expected.key();
        let mut state = self.inner.state.lock().await;
        match state.mutes.get(&key) {
            Some(current) if current.unmute_at == expected.unmute_at => {}
            Some(current) => {
                debug!(
                    "Keeping mute record for {key}: deadline moved from {} to {}",
                    expected.unmute_at, current.unmute_at
                );
                return Ok(false);
            }
            None => return Ok(false),
        }
        state.mutes.remove(&key);
        self.persist(&state).await?;
        Ok(true)
    }

    /// Every stored mute record, in no particular order
    pub async fn all_records(&self) -> Vec<MuteRecord> {
        let state = self.inner.state.lock().await;
        state.mutes.values().cloned().collect()
    }

    /// Append a warning and return the user's new warning count
    ///
    /// # Errors
    /// Returns `ModerationError::Persistence` if the document could not be written.
    pub async fn add_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        entry: WarnEntry,
    ) -> ModerationResult<usize> {
        let mut state = self.inner.state.lock().await;
        let entries = state.warns.entry(MuteKey::new(guild_id, user_id)).or_default();
        entries.push(entry);
        let count = entries.len();
        self.persist(&state).await?;
        Ok(count)
    }

    /// A user's warnings, oldest first
    pub async fn warnings(&self, guild_id: u64, user_id: u64) -> Vec<WarnEntry> {
        let state = self.inner.state.lock().await;
        state
            .warns
            .get(&MuteKey::new(guild_id, user_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Remove the warning at a 1-based `index`
    ///
    /// # Errors
    /// Returns `ModerationError::WarningNotFound` if there is no such warning,
    /// or `ModerationError::Persistence` if the document could not be written.
    pub async fn remove_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        index: usize,
    ) -> ModerationResult<WarnEntry> {
        let key = MuteKey::new(guild_id, user_id);
        let mut state = self.inner.state.lock().await;

        let entries = state
            .warns
            .get_mut(&key)
            .filter(|entries| index >= 1 && index <= entries.len())
            .ok_or(ModerationError::WarningNotFound { user_id, index })?;
        let removed = entries.remove(index - 1);
        if entries.is_empty() {
            state.warns.remove(&key);
        }

        self.persist(&state).await?;
        Ok(removed)
    }

    /// Rewrite the whole document. Callers hold the state lock.
    async fn persist(&self, state: &StoreState) -> ModerationResult<()> {
        let Some(path) = self.inner.path.as_deref() else {
            return Ok(());
        };

        let result = write_document(path, &state.to_document()).await;
        if let Err(e) = &result {
            error!(
                path = %path.display(),
                error = %e,
                "Failed to persist moderation store, continuing in memory"
            );
        }
        result
    }
}

/// Write to a sibling temp file, then rename it over the document
async fn write_document(path: &Path, document: &StoreDocument) -> ModerationResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(document)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
