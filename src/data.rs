use std::{ops::Deref, sync::Arc};

use crate::config::BotConfig;
use crate::moderation::MuteService;
use poise::serenity_prelude::prelude::TypeMapKey;

/// Shared state handed to every command and event handler
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Event handlers reach the data through serenity's TypeMap
impl TypeMapKey for Data {
    type Value = Data;
}

pub struct DataInner {
    pub config: BotConfig,
    pub moderation: MuteService,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("mute_mode", &self.moderation.settings().mode)
            .field("pending_unmutes", &self.moderation.scheduler().pending_count())
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(config: BotConfig, moderation: MuteService) -> Self {
        Self(Arc::new(DataInner { config, moderation }))
    }
}
