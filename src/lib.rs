pub mod commands;
pub mod config;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod moderation;

pub const BOT_NAME: &str = "hoshikuzu";
pub const COMMAND_TARGET: &str = "hoshikuzu::command";
pub const ERROR_TARGET: &str = "hoshikuzu::error";
pub const EVENT_TARGET: &str = "hoshikuzu::handlers";
pub const CONSOLE_TARGET: &str = "hoshikuzu";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
