use std::sync::Arc;

use serenity::{all::Context as SerenityContext, prelude::TypeMapKey};

use crate::{env::Config, scheduler::TimerScheduler, soundboard::SoundboardClient};

/// Process-lifetime state shared with the event handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<TimerScheduler>,
    pub soundboard: Arc<SoundboardClient>,
}

impl TypeMapKey for AppState {
    type Value = AppState;
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        scheduler: Arc<TimerScheduler>,
        soundboard: Arc<SoundboardClient>,
    ) -> Self {
        Self {
            config,
            scheduler,
            soundboard,
        }
    }

    pub async fn from_context(ctx: &SerenityContext) -> Option<Self> {
        ctx.data.read().await.get::<AppState>().cloned()
    }
}
