use crate::commands::{
    WARNING_COLOR, error_embed, info_embed, invoking_guild, reply_moderation_error, success_embed,
};
use crate::moderation::WarnEntry;
use crate::{Context, Error};
use poise::CreateReply;
use poise::serenity_prelude::{self as serenity, CreateEmbed, Mentionable};

/// Warning lists longer than this are truncated in the reply
const MAX_LISTED_WARNINGS: usize = 20;

/// Give a member a warning
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Reason for the warning"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    let reason = reason.trim();
    if reason.is_empty() {
        ctx.send(
            CreateReply::default()
                .embed(error_embed("❌ A reason is required."))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let count = match ctx
        .data()
        .moderation
        .warn(guild_id.get(), user.id.get(), ctx.author().id.get(), reason)
        .await
    {
        Ok(count) => count,
        Err(e) => return reply_moderation_error(ctx, e).await,
    };

    let embed = CreateEmbed::new().color(WARNING_COLOR).description(format!(
        "⚠️ {} has been warned ({count} warning{} total).\n**Reason:** {reason}",
        user.mention(),
        if count == 1 { "" } else { "s" }
    ));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// List a member's warnings
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    let entries = ctx
        .data()
        .moderation
        .warnings(guild_id.get(), user.id.get())
        .await;

    let embed = info_embed(format!("Warnings for {}", user.name))
        .description(format_warnings(&entries));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Remove one of a member's warnings by its number in `warnings`
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn delwarn(
    ctx: Context<'_>,
    #[description = "Member whose warning to remove"] user: serenity::User,
    #[description = "Warning number, as shown by the warnings command"] index: u32,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    let removed = match ctx
        .data()
        .moderation
        .remove_warning(guild_id.get(), user.id.get(), index as usize)
        .await
    {
        Ok(removed) => removed,
        Err(e) => return reply_moderation_error(ctx, e).await,
    };

    ctx.send(CreateReply::default().embed(success_embed(format!(
        "🗑️ Removed warning #{index} from {}: {}",
        user.mention(),
        removed.reason
    ))))
    .await?;
    Ok(())
}

/// Numbered list, 1-based to match `delwarn`
fn format_warnings(entries: &[WarnEntry]) -> String {
    if entries.is_empty() {
        return "No warnings.".to_string();
    }

    let mut lines: Vec<String> = entries
        .iter()
        .take(MAX_LISTED_WARNINGS)
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "**{}.** {} (by <@{}>, {})",
                i + 1,
                entry.reason,
                entry.issuer_id,
                entry.timestamp
            )
        })
        .collect();
    if entries.len() > MAX_LISTED_WARNINGS {
        lines.push(format!("…and {} more", entries.len() - MAX_LISTED_WARNINGS));
    }
    lines.join("\n")
}
