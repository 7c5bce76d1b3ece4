//! Platform seam
//!
//! The moderation core never talks to Discord directly. Everything it needs
//! from the platform goes through [`GuildSession`], and every platform error
//! is flattened into a [`SessionError`].

use crate::moderation::SessionError;
use poise::serenity_prelude::{
    self as serenity, Cache, ChannelId, ChannelType, CreateInvite, CreateMessage, GuildChannel,
    GuildId, Http, Member, PartialGuild, Timestamp, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Result type for platform calls
pub type SessionResult<T> = Result<T, SessionError>;

/// Relationship between a user and a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    /// The user is in the guild
    Member,
    /// The user exists but is not in the guild
    NotMember,
    /// No such user on the platform
    UnknownUser,
}

/// Capabilities the moderation core consumes from the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GuildSession: Send + Sync {
    /// Look up whether a user is a member of a guild
    async fn member_status(&self, guild_id: u64, user_id: u64) -> SessionResult<MemberStatus>;

    /// Remove the user from the guild (kick)
    async fn exclude_member(&self, guild_id: u64, user_id: u64) -> SessionResult<()>;

    /// Apply a native timeout until `until` (Unix seconds)
    async fn apply_timeout(&self, guild_id: u64, user_id: u64, until: i64) -> SessionResult<()>;

    /// Remove a native timeout
    async fn lift_timeout(&self, guild_id: u64, user_id: u64) -> SessionResult<()>;

    /// Create a unique invite and return its URL
    async fn create_invite(
        &self,
        channel_id: u64,
        max_age_secs: u32,
        max_uses: u8,
    ) -> SessionResult<String>;

    /// Send a direct message to a user
    async fn send_direct_message(&self, user_id: u64, text: String) -> SessionResult<()>;

    /// Display name of a guild
    async fn guild_name(&self, guild_id: u64) -> Option<String>;

    /// Whether a channel still exists in the guild
    async fn channel_in_guild(&self, guild_id: u64, channel_id: u64) -> bool;

    /// The guild's designated default (system) channel
    async fn resolve_default_channel(&self, guild_id: u64) -> Option<u64>;

    /// First text channel on which the bot may create invites
    async fn first_invitable_channel(&self, guild_id: u64) -> Option<u64>;

    /// Whether the bot may create invites on the channel
    async fn has_invite_capability(&self, guild_id: u64, channel_id: u64) -> bool;
}

/// Unknown Member and Unknown User both come back as 404
pub(crate) fn is_not_found(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Http(e) => e.status_code().is_some_and(|s| s.as_u16() == 404),
        _ => false,
    }
}

/// Lowest text channel, by position, passing `can_invite`
fn first_invitable<'a>(
    channels: impl IntoIterator<Item = &'a GuildChannel>,
    can_invite: impl Fn(&GuildChannel) -> bool,
) -> Option<u64> {
    let mut text_channels: Vec<_> = channels
        .into_iter()
        .filter(|c| c.kind == ChannelType::Text)
        .collect();
    text_channels.sort_by_key(|c| (c.position, c.id));
    text_channels
        .into_iter()
        .find(|c| can_invite(c))
        .map(|c| c.id.get())
}

/// [`GuildSession`] backed by serenity's HTTP client and cache
#[derive(Clone)]
pub struct SerenitySession {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenitySession {
    #[must_use]
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    /// Compute the bot's permission to invite on a channel from the cache.
    /// `None` when the guild, channel or bot member is not cached.
    fn cached_invite_permission(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<bool> {
        let bot_id = self.cache.current_user().id;
        let guild = self.cache.guild(guild_id)?;
        let channel = guild.channels.get(&channel_id)?;
        let member = guild.members.get(&bot_id)?;
        Some(
            guild
                .user_permissions_in(channel, member)
                .create_instant_invite(),
        )
    }

    /// `None` when the guild or the bot member is not cached
    fn cached_first_invitable(&self, guild_id: GuildId) -> Option<Option<u64>> {
        let bot_id = self.cache.current_user().id;
        let guild = self.cache.guild(guild_id)?;
        let member = guild.members.get(&bot_id)?;
        Some(first_invitable(guild.channels.values(), |c| {
            guild.user_permissions_in(c, member).create_instant_invite()
        }))
    }

    /// Guild, bot member and channels over HTTP, for guilds the cache does
    /// not hold yet (e.g. right after connecting)
    async fn fetch_invite_view(&self, guild_id: GuildId) -> Option<(PartialGuild, Member, Vec<GuildChannel>)> {
        let bot_id = self.cache.current_user().id;
        let fetched = async {
            let guild = guild_id.to_partial_guild(self.http.as_ref()).await?;
            let member = guild_id.member(self.http.as_ref(), bot_id).await?;
            let channels = guild_id.channels(self.http.as_ref()).await?;
            Ok::<_, serenity::Error>((guild, member, channels.into_values().collect()))
        };
        match fetched.await {
            Ok(view) => Some(view),
            Err(e) => {
                debug!("Could not fetch guild {guild_id} for invite checks: {e}");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl GuildSession for SerenitySession {
    async fn member_status(&self, guild_id: u64, user_id: u64) -> SessionResult<MemberStatus> {
        let guild_id = GuildId::new(guild_id);
        let user_id = UserId::new(user_id);

        match guild_id.member(self.http.as_ref(), user_id).await {
            Ok(_) => Ok(MemberStatus::Member),
            Err(e) if is_not_found(&e) => match user_id.to_user(self.http.as_ref()).await {
                Ok(_) => Ok(MemberStatus::NotMember),
                Err(e) if is_not_found(&e) => Ok(MemberStatus::UnknownUser),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn exclude_member(&self, guild_id: u64, user_id: u64) -> SessionResult<()> {
        GuildId::new(guild_id)
            .kick_with_reason(self.http.as_ref(), UserId::new(user_id), "Temporary mute")
            .await?;
        Ok(())
    }

    async fn apply_timeout(&self, guild_id: u64, user_id: u64, until: i64) -> SessionResult<()> {
        let until = Timestamp::from_unix_timestamp(until)
            .map_err(|e| SessionError::new(format!("invalid timeout deadline: {e}")))?;
        let mut member = GuildId::new(guild_id)
            .member(self.http.as_ref(), UserId::new(user_id))
            .await?;
        member
            .disable_communication_until_datetime(self.http.as_ref(), until)
            .await?;
        Ok(())
    }

    async fn lift_timeout(&self, guild_id: u64, user_id: u64) -> SessionResult<()> {
        let mut member = GuildId::new(guild_id)
            .member(self.http.as_ref(), UserId::new(user_id))
            .await?;
        member.enable_communication(self.http.as_ref()).await?;
        Ok(())
    }

    async fn create_invite(
        &self,
        channel_id: u64,
        max_age_secs: u32,
        max_uses: u8,
    ) -> SessionResult<String> {
        let builder = CreateInvite::new()
            .max_age(max_age_secs)
            .max_uses(max_uses)
            .unique(true)
            .audit_log_reason("Mute reinvitation");
        let invite = ChannelId::new(channel_id)
            .create_invite(self.http.as_ref(), builder)
            .await?;
        Ok(invite.url())
    }

    async fn send_direct_message(&self, user_id: u64, text: String) -> SessionResult<()> {
        UserId::new(user_id)
            .direct_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn guild_name(&self, guild_id: u64) -> Option<String> {
        let guild_id = GuildId::new(guild_id);
        if let Some(name) = self.cache.guild(guild_id).map(|g| g.name.clone()) {
            return Some(name);
        }
        guild_id
            .to_partial_guild(self.http.as_ref())
            .await
            .map(|g| g.name)
            .ok()
    }

    async fn channel_in_guild(&self, guild_id: u64, channel_id: u64) -> bool {
        let guild_id = GuildId::new(guild_id);
        let channel_id = ChannelId::new(channel_id);
        if let Some(found) = self
            .cache
            .guild(guild_id)
            .map(|g| g.channels.contains_key(&channel_id))
        {
            return found;
        }
        match guild_id.channels(self.http.as_ref()).await {
            Ok(channels) => channels.contains_key(&channel_id),
            Err(e) => {
                debug!("Could not list channels of guild {guild_id}: {e}");
                false
            }
        }
    }

    async fn resolve_default_channel(&self, guild_id: u64) -> Option<u64> {
        let guild_id = GuildId::new(guild_id);
        if let Some(cached) = self.cache.guild(guild_id).map(|g| g.system_channel_id) {
            return cached.map(ChannelId::get);
        }
        guild_id
            .to_partial_guild(self.http.as_ref())
            .await
            .ok()
            .and_then(|g| g.system_channel_id)
            .map(ChannelId::get)
    }

    async fn first_invitable_channel(&self, guild_id: u64) -> Option<u64> {
        let guild_id = GuildId::new(guild_id);
        if let Some(cached) = self.cached_first_invitable(guild_id) {
            return cached;
        }
        let (guild, member, channels) = self.fetch_invite_view(guild_id).await?;
        first_invitable(&channels, |c| {
            guild.user_permissions_in(c, &member).create_instant_invite()
        })
    }

    async fn has_invite_capability(&self, guild_id: u64, channel_id: u64) -> bool {
        let guild_id = GuildId::new(guild_id);
        let channel_id = ChannelId::new(channel_id);
        if let Some(allowed) = self.cached_invite_permission(guild_id, channel_id) {
            return allowed;
        }
        let Some((guild, member, channels)) = self.fetch_invite_view(guild_id).await else {
            return false;
        };
        channels
            .iter()
            .find(|c| c.id == channel_id)
            .is_some_and(|c| guild.user_permissions_in(c, &member).create_instant_invite())
    }
}
