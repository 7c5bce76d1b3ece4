//! Moderation service
//!
//! Ties the store, scheduler and unmute sequencer together behind the
//! operations the commands call: mute, unmute, warn. Constructed once at
//! startup and shared through the bot's data.

use crate::moderation::{
    Clock, GuildSession, MemberStatus, ModerationError, ModerationResult, ModerationStore,
    MuteKey, MuteMode, MuteRecord, MuteSettings, RehydrateSummary, UnmuteReport, UnmuteScheduler,
    UnmuteSequencer, UnmuteTrigger, WarnEntry, parse_duration,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Longest lifetime the platform accepts for an invite
const MAX_INVITE_AGE_SECS: u64 = 7 * 86_400;

/// What a successful mute did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteOutcome {
    pub record: MuteRecord,
    /// The user received the mute notice by DM
    pub notified: bool,
    /// The record reached the disk (it is always kept in memory)
    pub persisted: bool,
}

/// Entry point for mute, unmute and warning operations
pub struct MuteService {
    store: ModerationStore,
    scheduler: UnmuteScheduler,
    sequencer: Arc<UnmuteSequencer>,
    session: Arc<dyn GuildSession>,
    clock: Arc<dyn Clock>,
    settings: MuteSettings,
    rehydrated: AtomicBool,
}

impl MuteService {
    pub fn new(
        store: ModerationStore,
        session: Arc<dyn GuildSession>,
        clock: Arc<dyn Clock>,
        settings: MuteSettings,
    ) -> Self {
        let sequencer = Arc::new(UnmuteSequencer::new(
            store.clone(),
            Arc::clone(&session),
            settings,
        ));
        let scheduler = UnmuteScheduler::new(Arc::clone(&clock), sequencer.clone());
        Self {
            store,
            scheduler,
            sequencer,
            session,
            clock,
            settings,
            rehydrated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn store(&self) -> &ModerationStore {
        &self.store
    }

    #[must_use]
    pub fn scheduler(&self) -> &UnmuteScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn settings(&self) -> MuteSettings {
        self.settings
    }

    /// Mute a member for `duration_text` (e.g. `10m`).
    ///
    /// Nothing is persisted unless the platform accepted the exclusion (or
    /// timeout), so a failed kick never leaves an orphaned record. Waits for
    /// any unmute sequence of the same user to finish first.
    ///
    /// # Errors
    /// `InvalidDuration` / `DurationTooLong` for bad input, `TargetNotFound` /
    /// `NotMember` when the user cannot be muted, `PlatformRejected` when the
    /// platform refuses the lookup or the exclusion.
    pub async fn mute(
        &self,
        guild_id: u64,
        user_id: u64,
        duration_text: &str,
    ) -> ModerationResult<MuteOutcome> {
        let seconds = parse_duration(duration_text)
            .ok_or_else(|| ModerationError::InvalidDuration(duration_text.to_string()))?;
        if self.settings.mode == MuteMode::Timeout && seconds > self.settings.max_timeout_secs {
            return Err(ModerationError::DurationTooLong {
                seconds,
                max: self.settings.max_timeout_secs,
            });
        }

        let key = MuteKey::new(guild_id, user_id);
        let key_guard = self.sequencer.lock_key(key).await;

        match self.session.member_status(guild_id, user_id).await? {
            MemberStatus::Member => {}
            MemberStatus::NotMember => return Err(ModerationError::NotMember(user_id)),
            MemberStatus::UnknownUser => return Err(ModerationError::TargetNotFound(user_id)),
        }

        let unmute_at = self
            .clock
            .now()
            .saturating_add(i64::try_from(seconds).unwrap_or(i64::MAX));
        let guild_name = self
            .session
            .guild_name(guild_id)
            .await
            .unwrap_or_else(|| "the server".to_string());

        let (rejoin_channel_id, invite_url, notified) = match self.settings.mode {
            MuteMode::Exclusion => {
                let (channel_id, invite_url) = self.prepare_reinvite(guild_id, seconds).await;
                // The DM goes out first: once kicked, the user may no longer
                // share a server with the bot
                let text = mute_notice(self.settings.mode, &guild_name, duration_text, invite_url.as_deref());
                let notified = self.notify(guild_id, user_id, text).await;

                if let Err(e) = self.session.exclude_member(guild_id, user_id).await {
                    error!(guild_id, user_id, error = %e, "Kick during mute failed");
                    return Err(e.into());
                }
                (channel_id, invite_url, notified)
            }
            MuteMode::Timeout => {
                if let Err(e) = self.session.apply_timeout(guild_id, user_id, unmute_at).await {
                    error!(guild_id, user_id, error = %e, "Timeout during mute failed");
                    return Err(e.into());
                }
                let text = mute_notice(self.settings.mode, &guild_name, duration_text, None);
                (None, None, self.notify(guild_id, user_id, text).await)
            }
        };

        let record = MuteRecord {
            guild_id,
            user_id,
            unmute_at,
            rejoin_channel_id,
            invite_url,
        };
        let persisted = match self.store.put(record.clone()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(guild_id, user_id, error = %e, "Mute record kept in memory only");
                false
            }
        };
        // An overdue deadline runs the sequence inline, which takes the lock
        drop(key_guard);
        self.scheduler.arm(key, unmute_at).await;

        info!(
            guild_id,
            user_id,
            seconds,
            unmute_at,
            mode = %self.settings.mode,
            "User muted"
        );
        Ok(MuteOutcome {
            record,
            notified,
            persisted,
        })
    }

    /// Lift a mute before its deadline.
    ///
    /// The pending timer is cancelled before the sequence runs, so the
    /// scheduled expiry cannot run it a second time.
    ///
    /// # Errors
    /// `NotMuted` when no record exists for the user.
    pub async fn unmute(&self, guild_id: u64, user_id: u64) -> ModerationResult<UnmuteReport> {
        if self.store.get(guild_id, user_id).await.is_none() {
            return Err(ModerationError::NotMuted(user_id));
        }
        let key = MuteKey::new(guild_id, user_id);
        self.scheduler.cancel(key);
        Ok(self.sequencer.run(key, UnmuteTrigger::Manual).await)
    }

    /// A muted user came back to the guild before their deadline.
    ///
    /// In exclusion mode the re-join counts as an implicit unmute: the timer
    /// is cancelled and the record dropped. Timeouts survive a re-join on the
    /// platform side, so timeout mode leaves the mute in place.
    pub async fn handle_member_rejoin(&self, guild_id: u64, user_id: u64) -> Option<UnmuteReport> {
        if self.settings.mode != MuteMode::Exclusion {
            return None;
        }
        self.store.get(guild_id, user_id).await?;

        let key = MuteKey::new(guild_id, user_id);
        self.scheduler.cancel(key);
        info!(guild_id, user_id, "Muted user re-joined, clearing mute");
        Some(self.sequencer.run(key, UnmuteTrigger::Rejoined).await)
    }

    /// Rebuild timers for every stored mute
    pub async fn rehydrate(&self) -> RehydrateSummary {
        let records = self.store.all_records().await;
        self.scheduler.rehydrate_all(records).await
    }

    /// [`Self::rehydrate`] for the first caller only; later calls return `None`
    pub async fn rehydrate_once(&self) -> Option<RehydrateSummary> {
        if self.rehydrated.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(self.rehydrate().await)
    }

    /// Current mute record for a user
    pub async fn mute_record(&self, guild_id: u64, user_id: u64) -> Option<MuteRecord> {
        self.store.get(guild_id, user_id).await
    }

    /// Append a warning and return the user's warning count
    ///
    /// # Errors
    /// `Persistence` if the warning could not be written (it is kept in memory).
    pub async fn warn(
        &self,
        guild_id: u64,
        user_id: u64,
        issuer_id: u64,
        reason: &str,
    ) -> ModerationResult<usize> {
        let count = self
            .store
            .add_warning(guild_id, user_id, WarnEntry::now(issuer_id, reason))
            .await?;
        info!(guild_id, user_id, issuer_id, count, "Warning added");
        Ok(count)
    }

    /// A user's warnings, oldest first
    pub async fn warnings(&self, guild_id: u64, user_id: u64) -> Vec<WarnEntry> {
        self.store.warnings(guild_id, user_id).await
    }

    /// Remove a warning by its 1-based position
    ///
    /// # Errors
    /// `WarningNotFound` for an index out of range, `Persistence` on write failure.
    pub async fn remove_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        index: usize,
    ) -> ModerationResult<WarnEntry> {
        let removed = self.store.remove_warning(guild_id, user_id, index).await?;
        info!(guild_id, user_id, index, "Warning removed");
        Ok(removed)
    }

    /// Best-effort invite created at mute time, valid a little past the deadline
    async fn prepare_reinvite(&self, guild_id: u64, seconds: u64) -> (Option<u64>, Option<String>) {
        let channel_id = match self.session.resolve_default_channel(guild_id).await {
            Some(channel_id) => Some(channel_id),
            None => self.session.first_invitable_channel(guild_id).await,
        };
        let Some(channel_id) = channel_id else {
            return (None, None);
        };
        if !self.session.has_invite_capability(guild_id, channel_id).await {
            return (Some(channel_id), None);
        }

        let max_age = seconds
            .saturating_add(u64::from(self.settings.mute_invite_grace_secs))
            .min(MAX_INVITE_AGE_SECS);
        let max_age = u32::try_from(max_age).unwrap_or(u32::MAX);
        match self.session.create_invite(channel_id, max_age, 1).await {
            Ok(url) => (Some(channel_id), Some(url)),
            Err(e) => {
                warn!(guild_id, channel_id, error = %e, "Invite creation at mute time failed");
                (Some(channel_id), None)
            }
        }
    }

    async fn notify(&self, guild_id: u64, user_id: u64, text: String) -> bool {
        match self.session.send_direct_message(user_id, text).await {
            Ok(()) => true,
            Err(e) => {
                debug!(guild_id, user_id, error = %e, "Could not DM user about mute");
                false
            }
        }
    }
}

/// Direct message sent when a mute starts
fn mute_notice(mode: MuteMode, guild_name: &str, duration: &str, invite_url: Option<&str>) -> String {
    match (mode, invite_url) {
        (MuteMode::Exclusion, Some(url)) => format!(
            "🔇 You have been temporarily removed from **{guild_name}** for {duration}. \
             You can come back with this link once it ends: {url}"
        ),
        (MuteMode::Exclusion, None) => {
            format!("🔇 You have been temporarily removed from **{guild_name}** for {duration}.")
        }
        (MuteMode::Timeout, _) => format!("🔇 You have been muted on **{guild_name}** for {duration}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::clock::testing::TokioClock;
    use crate::moderation::{MockGuildSession, SessionError, SessionResult, StepOutcome};
    use mockall::predicate::eq;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const START: i64 = 1_700_000_000;
    const GUILD: u64 = 10;
    const USER: u64 = 20;

    fn service(store: ModerationStore, session: MockGuildSession, mode: MuteMode) -> MuteService {
        let settings = MuteSettings {
            mode,
            ..MuteSettings::default()
        };
        MuteService::new(
            store,
            Arc::new(session),
            Arc::new(TokioClock::starting_at(START)),
            settings,
        )
    }

    /// A guild where everything the mute flow asks for succeeds
    fn cooperative_session(expected_dms: usize) -> MockGuildSession {
        let mut session = MockGuildSession::new();
        session
            .expect_member_status()
            .returning(|_, _| Ok(MemberStatus::Member));
        session
            .expect_guild_name()
            .returning(|_| Some("Hoshikuzu".to_string()));
        session.expect_resolve_default_channel().returning(|_| Some(5));
        session.expect_channel_in_guild().return_const(true);
        session.expect_has_invite_capability().return_const(true);
        session
            .expect_create_invite()
            .returning(|channel, _, _| Ok(format!("https://discord.gg/c{channel}")));
        session
            .expect_exclude_member()
            .with(eq(GUILD), eq(USER))
            .times(1)
            .returning(|_, _| Ok(()));
        session
            .expect_send_direct_message()
            .times(expected_dms)
            .returning(|_, _| Ok(()));
        session
    }

    /// Timeout-mode guild whose timeout calls wait for a permit, so a test
    /// can hold a mute or an unmute in the middle of its platform call
    struct GatedSession {
        apply_gate: Semaphore,
        lift_gate: Semaphore,
        calls: Mutex<Vec<&'static str>>,
    }

    impl GatedSession {
        fn new(apply_permits: usize, lift_permits: usize) -> Self {
            Self {
                apply_gate: Semaphore::new(apply_permits),
                lift_gate: Semaphore::new(lift_permits),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        async fn pass(&self, gate: &Semaphore, call: &'static str) {
            gate.acquire().await.unwrap().forget();
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl GuildSession for GatedSession {
        async fn member_status(&self, _: u64, _: u64) -> SessionResult<MemberStatus> {
            Ok(MemberStatus::Member)
        }

        async fn exclude_member(&self, _: u64, _: u64) -> SessionResult<()> {
            Ok(())
        }

        async fn apply_timeout(&self, _: u64, _: u64, _: i64) -> SessionResult<()> {
            self.pass(&self.apply_gate, "apply").await;
            Ok(())
        }

        async fn lift_timeout(&self, _: u64, _: u64) -> SessionResult<()> {
            self.pass(&self.lift_gate, "lift").await;
            Ok(())
        }

        async fn create_invite(&self, _: u64, _: u32, _: u8) -> SessionResult<String> {
            Err(SessionError::new("no invites in timeout mode"))
        }

        async fn send_direct_message(&self, _: u64, _: String) -> SessionResult<()> {
            Ok(())
        }

        async fn guild_name(&self, _: u64) -> Option<String> {
            None
        }

        async fn channel_in_guild(&self, _: u64, _: u64) -> bool {
            false
        }

        async fn resolve_default_channel(&self, _: u64) -> Option<u64> {
            None
        }

        async fn first_invitable_channel(&self, _: u64) -> Option<u64> {
            None
        }

        async fn has_invite_capability(&self, _: u64, _: u64) -> bool {
            false
        }
    }

    fn gated_service(store: &ModerationStore, session: &Arc<GatedSession>) -> Arc<MuteService> {
        let settings = MuteSettings {
            mode: MuteMode::Timeout,
            ..MuteSettings::default()
        };
        Arc::new(MuteService::new(
            store.clone(),
            session.clone(),
            Arc::new(TokioClock::starting_at(START)),
            settings,
        ))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_then_expiry() {
        let store = ModerationStore::in_memory();
        let service = service(store.clone(), cooperative_session(2), MuteMode::Exclusion);

        let outcome = service.mute(GUILD, USER, "10m").await.unwrap();
        assert_eq!(outcome.record.unmute_at, START + 600);
        assert_eq!(outcome.record.rejoin_channel_id, Some(5));
        assert_eq!(outcome.record.invite_url.as_deref(), Some("https://discord.gg/c5"));
        assert!(outcome.notified);
        assert!(outcome.persisted);

        assert_eq!(store.get(GUILD, USER).await, Some(outcome.record.clone()));
        assert_eq!(
            service.scheduler().pending(MuteKey::new(GUILD, USER)),
            Some(START + 600)
        );

        advance(599).await;
        assert!(store.get(GUILD, USER).await.is_some());

        advance(1).await;
        assert_eq!(store.get(GUILD, USER).await, None);
        assert_eq!(service.scheduler().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_invite_lives_past_deadline() {
        let mut session = MockGuildSession::new();
        session
            .expect_member_status()
            .returning(|_, _| Ok(MemberStatus::Member));
        session.expect_guild_name().returning(|_| None);
        session.expect_resolve_default_channel().returning(|_| None);
        session.expect_first_invitable_channel().returning(|_| Some(8));
        session.expect_has_invite_capability().return_const(true);
        session
            .expect_create_invite()
            .with(eq(8), eq(3_660), eq(1))
            .times(1)
            .returning(|_, _, _| Ok("https://discord.gg/x".to_string()));
        session
            .expect_send_direct_message()
            .withf(|_, text| text.contains("the server") && text.contains("https://discord.gg/x"))
            .returning(|_, _| Ok(()));
        session.expect_exclude_member().returning(|_, _| Ok(()));

        let service = service(ModerationStore::in_memory(), session, MuteMode::Exclusion);
        let outcome = service.mute(GUILD, USER, "1h").await.unwrap();
        assert_eq!(outcome.record.rejoin_channel_id, Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_exclusion_persists_nothing() {
        let mut session = MockGuildSession::new();
        session
            .expect_member_status()
            .returning(|_, _| Ok(MemberStatus::Member));
        session.expect_guild_name().returning(|_| None);
        session.expect_resolve_default_channel().returning(|_| None);
        session.expect_first_invitable_channel().returning(|_| None);
        session.expect_send_direct_message().returning(|_, _| Ok(()));
        session
            .expect_exclude_member()
            .returning(|_, _| Err(SessionError::new("Missing Permissions")));

        let store = ModerationStore::in_memory();
        let service = service(store.clone(), session, MuteMode::Exclusion);

        let error = service.mute(GUILD, USER, "10m").await.unwrap_err();
        assert!(matches!(error, ModerationError::PlatformRejected(_)));
        assert_eq!(store.get(GUILD, USER).await, None);
        assert_eq!(service.scheduler().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_duration_touches_nothing() {
        // No expectations: any platform call would panic
        let service = service(
            ModerationStore::in_memory(),
            MockGuildSession::new(),
            MuteMode::Exclusion,
        );
        for text in ["", "10x", "-5m", "abc"] {
            let error = service.mute(GUILD, USER, text).await.unwrap_err();
            assert!(matches!(error, ModerationError::InvalidDuration(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_resolution_errors() {
        let mut session = MockGuildSession::new();
        session
            .expect_member_status()
            .with(eq(GUILD), eq(1))
            .returning(|_, _| Ok(MemberStatus::NotMember));
        session
            .expect_member_status()
            .with(eq(GUILD), eq(2))
            .returning(|_, _| Ok(MemberStatus::UnknownUser));
        session
            .expect_member_status()
            .with(eq(GUILD), eq(3))
            .returning(|_, _| Err(SessionError::new("Service Unavailable")));
        session.expect_exclude_member().never();

        let service = service(ModerationStore::in_memory(), session, MuteMode::Exclusion);
        assert!(matches!(
            service.mute(GUILD, 1, "1m").await,
            Err(ModerationError::NotMember(1))
        ));
        assert!(matches!(
            service.mute(GUILD, 2, "1m").await,
            Err(ModerationError::TargetNotFound(2))
        ));
        assert!(matches!(
            service.mute(GUILD, 3, "1m").await,
            Err(ModerationError::PlatformRejected(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_unmute_cancels_pending_timer() {
        let store = ModerationStore::in_memory();
        // Mute notice and manual unmute notice; an expiry fire would be a third
        let service = service(store.clone(), cooperative_session(2), MuteMode::Exclusion);

        service.mute(GUILD, USER, "1h").await.unwrap();
        let report = service.unmute(GUILD, USER).await.unwrap();

        assert_eq!(report.trigger, UnmuteTrigger::Manual);
        assert!(report.record_found);
        assert_eq!(report.invite, StepOutcome::Done);
        assert_eq!(report.removal, StepOutcome::Done);
        assert_eq!(service.scheduler().pending_count(), 0);

        advance(7_200).await;
        assert_eq!(store.get(GUILD, USER).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_without_record() {
        let service = service(
            ModerationStore::in_memory(),
            MockGuildSession::new(),
            MuteMode::Exclusion,
        );
        assert!(matches!(
            service.unmute(GUILD, USER).await,
            Err(ModerationError::NotMuted(USER))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remute_replaces_record_and_timer() {
        let mut session = MockGuildSession::new();
        session
            .expect_member_status()
            .returning(|_, _| Ok(MemberStatus::Member));
        session.expect_guild_name().returning(|_| None);
        session
            .expect_apply_timeout()
            .times(2)
            .returning(|_, _, _| Ok(()));
        session.expect_lift_timeout().times(1).returning(|_, _| Ok(()));
        session.expect_send_direct_message().returning(|_, _| Ok(()));

        let store = ModerationStore::in_memory();
        let service = service(store.clone(), session, MuteMode::Timeout);

        service.mute(GUILD, USER, "100s").await.unwrap();
        service.mute(GUILD, USER, "200s").await.unwrap();
        assert_eq!(store.get(GUILD, USER).await.unwrap().unmute_at, START + 200);

        advance(150).await;
        assert!(store.get(GUILD, USER).await.is_some());

        advance(50).await;
        assert_eq!(store.get(GUILD, USER).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remute_during_running_unmute_keeps_new_mute() {
        let store = ModerationStore::in_memory();
        let session = Arc::new(GatedSession::new(2, 0));
        let service = gated_service(&store, &session);
        let key = MuteKey::new(GUILD, USER);

        service.mute(GUILD, USER, "10s").await.unwrap();

        // Expiry starts its sequence and blocks on the timeout removal
        advance(10).await;
        assert_eq!(session.calls(), vec!["apply"]);

        let remute = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.mute(GUILD, USER, "1h").await }
        });
        settle().await;
        assert!(!remute.is_finished());

        session.lift_gate.add_permits(2);
        let outcome = remute.await.unwrap().unwrap();

        assert_eq!(session.calls(), vec!["apply", "lift", "apply"]);
        assert_eq!(outcome.record.unmute_at, START + 10 + 3_600);
        assert_eq!(store.get(GUILD, USER).await, Some(outcome.record.clone()));
        assert_eq!(service.scheduler().pending(key), Some(START + 10 + 3_600));

        advance(3_600).await;
        assert_eq!(store.get(GUILD, USER).await, None);
        assert_eq!(session.calls(), vec!["apply", "lift", "apply", "lift"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_during_running_remute_is_superseded() {
        let store = ModerationStore::in_memory();
        let session = Arc::new(GatedSession::new(1, 1));
        let service = gated_service(&store, &session);

        service.mute(GUILD, USER, "10s").await.unwrap();
        advance(5).await;

        // Re-mute holds the key while the platform call is pending
        let remute = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.mute(GUILD, USER, "1h").await }
        });
        settle().await;

        // Old deadline passes; its sequence waits for the re-mute
        advance(5).await;
        assert_eq!(session.calls(), vec!["apply"]);

        session.apply_gate.add_permits(1);
        let outcome = remute.await.unwrap().unwrap();
        settle().await;

        assert_eq!(session.calls(), vec!["apply", "apply"]);
        assert_eq!(outcome.record.unmute_at, START + 5 + 3_600);
        assert_eq!(store.get(GUILD, USER).await, Some(outcome.record));
        assert_eq!(
            service.scheduler().pending(MuteKey::new(GUILD, USER)),
            Some(START + 5 + 3_600)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_once_runs_a_single_time() {
        let store = ModerationStore::in_memory();
        store
            .put(MuteRecord {
                guild_id: GUILD,
                user_id: USER,
                unmute_at: START + 60,
                rejoin_channel_id: None,
                invite_url: None,
            })
            .await
            .unwrap();
        let service = service(store, MockGuildSession::new(), MuteMode::Exclusion);

        assert_eq!(
            service.rehydrate_once().await,
            Some(RehydrateSummary { armed: 1, fired: 0 })
        );
        assert_eq!(service.rehydrate_once().await, None);
        assert_eq!(service.scheduler().pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mode_applies_platform_timeout() {
        let mut session = MockGuildSession::new();
        session
            .expect_member_status()
            .returning(|_, _| Ok(MemberStatus::Member));
        session.expect_guild_name().returning(|_| None);
        session
            .expect_apply_timeout()
            .with(eq(GUILD), eq(USER), eq(START + 3_600))
            .times(1)
            .returning(|_, _, _| Ok(()));
        session.expect_exclude_member().never();
        session.expect_create_invite().never();
        session.expect_send_direct_message().returning(|_, _| Ok(()));

        let service = service(ModerationStore::in_memory(), session, MuteMode::Timeout);
        let outcome = service.mute(GUILD, USER, "1h").await.unwrap();
        assert_eq!(outcome.record.invite_url, None);

        let error = service.mute(GUILD, USER, "29d").await.unwrap_err();
        assert!(matches!(
            error,
            ModerationError::DurationTooLong { seconds: 2_505_600, max: 2_419_200 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_after_restart() {
        let path = std::env::temp_dir()
            .join(format!("hoshikuzu-test-{}", uuid::Uuid::new_v4()))
            .join("moderation.json");

        let before = ModerationStore::open(&path).await;
        for (user_id, unmute_at) in [(1, START - 60), (2, START + 60)] {
            before
                .put(MuteRecord {
                    guild_id: GUILD,
                    user_id,
                    unmute_at,
                    rejoin_channel_id: None,
                    invite_url: None,
                })
                .await
                .unwrap();
        }
        drop(before);

        let mut session = MockGuildSession::new();
        session.expect_guild_name().returning(|_| None);
        session.expect_resolve_default_channel().returning(|_| None);
        session.expect_first_invitable_channel().returning(|_| None);
        session
            .expect_send_direct_message()
            .times(2)
            .returning(|_, _| Ok(()));

        let store = ModerationStore::open(&path).await;
        let service = service(store.clone(), session, MuteMode::Exclusion);

        let summary = service.rehydrate().await;
        assert_eq!(summary, RehydrateSummary { armed: 1, fired: 1 });
        assert_eq!(store.get(GUILD, 1).await, None);
        assert!(store.get(GUILD, 2).await.is_some());

        advance(60).await;
        assert!(store.all_records().await.is_empty());

        let reopened = ModerationStore::open(&path).await;
        assert!(reopened.all_records().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_clears_mute_in_exclusion_mode() {
        let store = ModerationStore::in_memory();
        let service = service(store.clone(), cooperative_session(1), MuteMode::Exclusion);

        service.mute(GUILD, USER, "1d").await.unwrap();
        let report = service.handle_member_rejoin(GUILD, USER).await.unwrap();

        assert_eq!(report.trigger, UnmuteTrigger::Rejoined);
        assert_eq!(report.removal, StepOutcome::Done);
        assert_eq!(service.scheduler().pending_count(), 0);
        assert!(service.handle_member_rejoin(GUILD, USER).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_log() {
        let service = service(
            ModerationStore::in_memory(),
            MockGuildSession::new(),
            MuteMode::Exclusion,
        );

        assert_eq!(service.warn(GUILD, USER, 99, "spam").await.unwrap(), 1);
        assert_eq!(service.warn(GUILD, USER, 98, "insultes").await.unwrap(), 2);

        let warnings = service.warnings(GUILD, USER).await;
        assert_eq!(warnings[0].issuer_id, 99);
        assert_eq!(warnings[1].reason, "insultes");

        let removed = service.remove_warning(GUILD, USER, 1).await.unwrap();
        assert_eq!(removed.reason, "spam");
        assert_eq!(service.warnings(GUILD, USER).await.len(), 1);
        assert!(matches!(
            service.remove_warning(GUILD, USER, 5).await,
            Err(ModerationError::WarningNotFound { index: 5, .. })
        ));
    }

    #[test]
    fn test_mute_notice_text() {
        assert_eq!(
            mute_notice(MuteMode::Exclusion, "G", "10m", None),
            "🔇 You have been temporarily removed from **G** for 10m."
        );
        assert!(mute_notice(MuteMode::Exclusion, "G", "10m", Some("https://discord.gg/x"))
            .ends_with("once it ends: https://discord.gg/x"));
        assert_eq!(
            mute_notice(MuteMode::Timeout, "G", "1h", Some("ignored")),
            "🔇 You have been muted on **G** for 1h."
        );
    }
}
