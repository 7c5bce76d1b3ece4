use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::prelude::{TypeMap, TypeMapKey};
use poise::serenity_prelude::{self as serenity, Context, EventHandler, GuildId, Member, Ready};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct Handler;

/// Present in the TypeMap once `cache_ready` has been seen
struct CacheReady;

impl TypeMapKey for CacheReady {
    type Value = ();
}

impl Handler {
    /// Shared data, inserted into the TypeMap once the framework is set up
    async fn data(ctx: &Context) -> Option<Data> {
        ctx.data.read().await.get::<Data>().cloned()
    }
}

/// Publish the shared data to event handlers. Returns `true` when the cache
/// was already ready, in which case the caller restores pending mutes.
pub async fn install_data(map: &RwLock<TypeMap>, data: Data) -> bool {
    let mut map = map.write().await;
    map.insert::<Data>(data);
    map.contains_key::<CacheReady>()
}

/// Record that the cache is ready; returns the data if already installed
async fn mark_cache_ready(map: &RwLock<TypeMap>) -> Option<Data> {
    let mut map = map.write().await;
    map.insert::<CacheReady>(());
    map.get::<Data>().cloned()
}

/// Re-arm timers for stored mutes, once per process
pub async fn restore_pending_mutes(data: &Data) {
    if let Some(summary) = data.moderation.rehydrate_once().await {
        info!(
            target: EVENT_TARGET,
            armed = summary.armed,
            fired = summary.fired,
            "Pending mutes restored"
        );
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated. Overdue unmutes need guild
    /// channels and permissions, so timers are restored from here.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");

        match mark_cache_ready(&ctx.data).await {
            Some(data) => restore_pending_mutes(&data).await,
            None => debug!(target: EVENT_TARGET, "Cache ready before data, restoring at setup"),
        }
    }

    /// A muted user coming back through their invite ends the mute early.
    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        let Some(data) = Self::data(&ctx).await else {
            debug!(target: EVENT_TARGET, "Member joined before data was ready");
            return;
        };

        let guild_id = new_member.guild_id.get();
        let user_id = new_member.user.id.get();
        if let Some(report) = data.moderation.handle_member_rejoin(guild_id, user_id).await {
            info!(
                target: EVENT_TARGET,
                guild_id,
                user_id,
                status = %report.status,
                removal = ?report.removal,
                "Muted member re-joined"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BotConfig;
    use crate::moderation::{MockGuildSession, ModerationStore, MuteRecord, MuteService, SystemClock};
    use std::sync::Arc;

    async fn data_with_pending_mute() -> Data {
        let store = ModerationStore::in_memory();
        store
            .put(MuteRecord {
                guild_id: 1,
                user_id: 2,
                unmute_at: chrono::Utc::now().timestamp() + 3_600,
                rejoin_channel_id: None,
                invite_url: None,
            })
            .await
            .unwrap();
        let config = BotConfig::default();
        let service = MuteService::new(
            store,
            Arc::new(MockGuildSession::new()),
            Arc::new(SystemClock),
            config.mute_settings(),
        );
        Data::new(config, service)
    }

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[tokio::test]
    async fn test_cache_ready_after_setup_restores_timers() {
        let map = RwLock::new(TypeMap::new());
        let data = data_with_pending_mute().await;

        assert!(!install_data(&map, data.clone()).await);
        assert_eq!(data.moderation.scheduler().pending_count(), 0);

        let ready = mark_cache_ready(&map).await.unwrap();
        restore_pending_mutes(&ready).await;
        assert_eq!(data.moderation.scheduler().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_setup_after_cache_ready_restores_timers() {
        let map = RwLock::new(TypeMap::new());
        let data = data_with_pending_mute().await;

        assert!(mark_cache_ready(&map).await.is_none());
        assert!(install_data(&map, data.clone()).await);
        restore_pending_mutes(&data).await;
        assert_eq!(data.moderation.scheduler().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_repeated_cache_ready_restores_once() {
        let map = RwLock::new(TypeMap::new());
        let data = data_with_pending_mute().await;
        install_data(&map, data.clone()).await;

        for _ in 0..2 {
            let ready = mark_cache_ready(&map).await.unwrap();
            restore_pending_mutes(&ready).await;
        }
        assert_eq!(data.moderation.scheduler().pending_count(), 1);
        assert_eq!(data.moderation.rehydrate_once().await, None);
    }
}
