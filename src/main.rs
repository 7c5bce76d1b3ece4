use std::sync::Arc;

use hoshikuzu::moderation::{ModerationStore, MuteService, SerenitySession, SystemClock};
use hoshikuzu::{BOT_NAME, BotConfig, Data, ERROR_TARGET, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config = BotConfig::load().await?;
    logging::init(&config.log_dir)?;
    info!("Configuration loaded from {}", config.source_description());
    logging::log_console(&format!("{BOT_NAME} starting with {config:?}"));

    let token = config.token.clone();
    let prefix = config.prefix.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::commands(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!(target: ERROR_TARGET, error = %e, "Could not report command error");
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let session = Arc::new(SerenitySession::new(ctx.http.clone(), ctx.cache.clone()));
                let store = ModerationStore::open(config.data_file.clone()).await;
                let moderation = MuteService::new(
                    store,
                    session,
                    Arc::new(SystemClock),
                    config.mute_settings(),
                );
                let data = Data::new(config, moderation);

                // Timers are restored on cache_ready; if that already passed,
                // restore them here instead
                if handlers::install_data(&ctx.data, data.clone()).await {
                    handlers::restore_pending_mutes(&data).await;
                }
                Ok(data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    client.start().await?;
    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
