//! Prefix and slash commands
//!
//! Commands are thin: they resolve the invoking guild, call into
//! [`crate::moderation::MuteService`] and turn the outcome into a reply.

mod basic;
mod mute;
mod warn;

use crate::moderation::ModerationError;
use crate::{Context, Data, Error};
use poise::CreateReply;
use poise::serenity_prelude::{Colour, CreateEmbed, GuildId};

pub use basic::{ban, clear, kick, unban};
pub use mute::{mute, unmute};
pub use warn::{delwarn, warn, warnings};

pub const SUCCESS_COLOR: Colour = Colour::from_rgb(16, 185, 129);
pub const ERROR_COLOR: Colour = Colour::from_rgb(244, 63, 94);
pub const WARNING_COLOR: Colour = Colour::from_rgb(245, 158, 11);
pub const INFO_COLOR: Colour = Colour::from_rgb(100, 116, 139);

/// Every command the bot registers
#[must_use]
pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        mute(),
        unmute(),
        warn(),
        warnings(),
        delwarn(),
        clear(),
        kick(),
        ban(),
        unban(),
    ]
}

pub fn success_embed(description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .color(SUCCESS_COLOR)
        .description(description)
}

pub fn error_embed(description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .color(ERROR_COLOR)
        .description(description)
}

pub fn info_embed(title: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new().color(INFO_COLOR).title(title)
}

/// The guild a `guild_only` command was invoked in
pub(crate) fn invoking_guild(ctx: Context<'_>) -> Result<GuildId, Error> {
    ctx.guild_id()
        .ok_or_else(|| "this command only works in a server".into())
}

/// Reply to a moderation error. User mistakes are answered, not raised;
/// platform and persistence failures also go to the framework's error hook.
pub(crate) async fn reply_moderation_error(
    ctx: Context<'_>,
    error: ModerationError,
) -> Result<(), Error> {
    let reply = CreateReply::default()
        .embed(error_embed(format!("❌ {}", error.user_message())))
        .ephemeral(true);
    ctx.send(reply).await?;

    match error {
        ModerationError::PlatformRejected(_) | ModerationError::Persistence(_) => Err(error.into()),
        _ => Ok(()),
    }
}
