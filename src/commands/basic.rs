use crate::commands::{ERROR_COLOR, SUCCESS_COLOR, WARNING_COLOR, error_embed, invoking_guild};
use crate::moderation::is_not_found;
use crate::{Context, Error};
use poise::CreateReply;
use poise::serenity_prelude::{
    self as serenity, Colour, CreateEmbed, GetMessages, Mentionable, MessageId, UserId,
};
use std::time::Duration;
use tracing::warn;

const CLEAR_NOTICE_LIFETIME: Duration = Duration::from_secs(5);

fn action_embed(color: Colour, title: &str, description: String) -> CreateEmbed {
    CreateEmbed::new()
        .color(color)
        .title(title)
        .description(description)
}

async fn reply_failure(ctx: Context<'_>, description: &str) -> Result<(), Error> {
    ctx.send(
        CreateReply::default()
            .embed(error_embed(format!("❌ {description}")))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Bulk delete recent messages in this channel
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "Number of messages to delete (1-100)"] amount: Option<u8>,
) -> Result<(), Error> {
    let Some(amount) = clear_amount(amount) else {
        return reply_failure(ctx, "The amount must be between 1 and 100.").await;
    };

    let channel_id = ctx.channel_id();
    let messages = channel_id
        .messages(ctx.http(), GetMessages::new().limit(amount))
        .await?;
    let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
    if !ids.is_empty() {
        channel_id.delete_messages(ctx.http(), &ids).await?;
    }

    let reply = ctx
        .send(CreateReply::default().embed(action_embed(
            Colour::BLUE,
            "Clear",
            format!("🧹 {} messages deleted.", ids.len()),
        )))
        .await?;
    tokio::time::sleep(CLEAR_NOTICE_LIFETIME).await;
    reply.delete(ctx).await?;
    Ok(())
}

/// Kick a member from the server
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    if let Err(e) = guild_id.member(ctx.http(), user.id).await {
        if !is_not_found(&e) {
            warn!(guild_id = guild_id.get(), user_id = user.id.get(), error = %e, "Member lookup before kick failed");
        }
        return reply_failure(ctx, kick_lookup_failure(&e)).await;
    }

    if let Err(e) = guild_id.kick(ctx.http(), user.id).await {
        warn!(guild_id = guild_id.get(), user_id = user.id.get(), error = %e, "Kick failed");
        return reply_failure(ctx, "Unable to kick this user.").await;
    }

    ctx.send(CreateReply::default().embed(action_embed(
        WARNING_COLOR,
        "Kick",
        format!("👢 {} has been kicked from the server.", user.mention()),
    )))
    .await?;
    Ok(())
}

/// Ban a user from the server, member or not
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    if let Err(e) = guild_id.ban(ctx.http(), user.id, 0).await {
        warn!(guild_id = guild_id.get(), user_id = user.id.get(), error = %e, "Ban failed");
        return reply_failure(ctx, "Unable to ban this user.").await;
    }

    ctx.send(CreateReply::default().embed(action_embed(
        ERROR_COLOR,
        "Ban",
        format!("⛔ {} has been banned from the server.", user.mention()),
    )))
    .await?;
    Ok(())
}

/// Lift a ban by user ID
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "ID of the banned user"] user_id: String,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    let Some(user_id) = parse_user_id(&user_id) else {
        return reply_failure(ctx, "Provide a valid numeric ID.").await;
    };

    if let Err(e) = guild_id.unban(ctx.http(), user_id).await {
        warn!(guild_id = guild_id.get(), user_id = user_id.get(), error = %e, "Unban failed");
        return reply_failure(ctx, "Unable to unban this user (invalid ID or not banned).").await;
    }

    ctx.send(CreateReply::default().embed(action_embed(
        SUCCESS_COLOR,
        "Unban",
        format!("✅ {} has been unbanned.", user_id.mention()),
    )))
    .await?;
    Ok(())
}

/// Only a 404 means the user is not in the guild
fn kick_lookup_failure(error: &serenity::Error) -> &'static str {
    if is_not_found(error) {
        "That user is not a member of this server."
    } else {
        "Unable to kick this user."
    }
}

/// Default 5, accepted range 1..=100
fn clear_amount(requested: Option<u8>) -> Option<u8> {
    let amount = requested.unwrap_or(5);
    (1..=100).contains(&amount).then_some(amount)
}

fn parse_user_id(text: &str) -> Option<UserId> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u64>()
        .ok()
        .filter(|&id| id != 0)
        .map(UserId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_amount() {
        assert_eq!(clear_amount(None), Some(5));
        assert_eq!(clear_amount(Some(1)), Some(1));
        assert_eq!(clear_amount(Some(100)), Some(100));
        assert_eq!(clear_amount(Some(0)), None);
        assert_eq!(clear_amount(Some(101)), None);
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("123456789"), Some(UserId::new(123_456_789)));
        assert_eq!(parse_user_id(" 42 "), Some(UserId::new(42)));
        assert_eq!(parse_user_id("0"), None);
        assert_eq!(parse_user_id("<@42>"), None);
        assert_eq!(parse_user_id("-42"), None);
        assert_eq!(parse_user_id("99999999999999999999999"), None);
    }

    #[test]
    fn test_kick_lookup_failure_is_generic_unless_not_found() {
        let outage = serenity::Error::Other("Service Unavailable");
        assert_eq!(kick_lookup_failure(&outage), "Unable to kick this user.");

        let throttled = serenity::Error::Url("rate limited".to_string());
        assert_ne!(
            kick_lookup_failure(&throttled),
            "That user is not a member of this server."
        );
    }

    #[test]
    fn test_permissions() {
        assert!(clear().required_permissions.manage_messages());
        assert!(kick().required_permissions.kick_members());
        assert!(ban().required_permissions.ban_members());
        assert!(unban().required_permissions.ban_members());
    }
}
