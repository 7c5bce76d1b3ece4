use crate::commands::{invoking_guild, reply_moderation_error, success_embed};
use crate::moderation::{MuteOutcome, SequenceStatus, StepOutcome, UnmuteReport};
use crate::{Context, Error};
use poise::CreateReply;
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Temporarily mute a member
///
/// The duration is a number followed by s, m, h or d (e.g. `10m`, `2d`).
/// A bare number counts as seconds.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] user: serenity::User,
    #[description = "How long, e.g. 30s, 10m, 1h, 2d"] duration: String,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    ctx.defer().await?;

    let outcome = match ctx
        .data()
        .moderation
        .mute(guild_id.get(), user.id.get(), &duration)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return reply_moderation_error(ctx, e).await,
    };

    let description = mute_summary(&user.mention().to_string(), &duration, &outcome);
    ctx.send(CreateReply::default().embed(success_embed(description)))
        .await?;
    Ok(())
}

/// Lift a member's mute before it expires
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = invoking_guild(ctx)?;
    ctx.defer().await?;

    let report = match ctx
        .data()
        .moderation
        .unmute(guild_id.get(), user.id.get())
        .await
    {
        Ok(report) => report,
        Err(e) => return reply_moderation_error(ctx, e).await,
    };

    let description = unmute_summary(&user.mention().to_string(), &report);
    ctx.send(CreateReply::default().embed(success_embed(description)))
        .await?;
    Ok(())
}

fn mute_summary(mention: &str, duration: &str, outcome: &MuteOutcome) -> String {
    let mut lines = vec![format!(
        "🔇 {mention} has been muted for {duration} (until <t:{}:f>).",
        outcome.record.unmute_at
    )];
    if !outcome.notified {
        lines.push("⚠️ Could not send them a direct message.".to_string());
    }
    if !outcome.persisted {
        lines.push("⚠️ The mute could not be saved and will not survive a restart.".to_string());
    }
    lines.join("\n")
}

fn unmute_summary(mention: &str, report: &UnmuteReport) -> String {
    match report.status {
        SequenceStatus::Ran => {}
        SequenceStatus::AlreadyRunning => {
            return format!("⏳ An unmute for {mention} is already in progress.");
        }
        SequenceStatus::Superseded => {
            return format!("ℹ️ {mention} was muted again in the meantime; the new mute stays.");
        }
    }

    let mut lines = vec![format!("🔊 {mention} has been unmuted.")];
    match (&report.invite_url, &report.invite) {
        (Some(url), _) => lines.push(format!("Invite sent: {url}")),
        (None, StepOutcome::Failed(_)) => {
            lines.push("⚠️ No invite could be created for them.".to_string());
        }
        _ => {}
    }
    if report.restriction.is_failed() {
        lines.push("⚠️ Their timeout could not be lifted.".to_string());
    }
    if report.notification.is_failed() {
        lines.push("⚠️ Could not send them a direct message.".to_string());
    }
    if report.removal.is_failed() {
        lines.push("⚠️ The mute record could not be cleared from disk.".to_string());
    }
    lines.join("\n")
}
