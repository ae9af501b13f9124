use anyhow::Result;
use once_cell::sync::Lazy;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use tracing::{debug, info};

use crate::error::JobError;

const API_BASE: &str = "https://discord.com/api/v10";

static HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("DiscordBot (timer-bell, 0.1)")
        .build()
        .unwrap_or_default()
});

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SoundboardSound {
    pub name: String,
    pub sound_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default = "available_default")]
    pub available: bool,
}

fn available_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct GuildSounds {
    items: Vec<SoundboardSound>,
}

#[derive(Debug, Serialize)]
struct SendSoundboardSound<'a> {
    sound_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_guild_id: Option<&'a str>,
}

#[async_trait]
pub trait SoundboardDispatch: Send + Sync {
    /// Plays the named sound in a voice channel the bot is connected to.
    async fn dispatch(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        name: &str,
    ) -> Result<(), JobError>;
}

pub struct SoundboardClient {
    token: String,
    base: String,
}

impl SoundboardClient {
    pub fn new(token: &str) -> Self {
        Self {
            token: format!("Bot {token}"),
            base: API_BASE.to_string(),
        }
    }

    /// Guild sounds first, then the built-in defaults.
    pub async fn list(&self, guild_id: GuildId) -> Result<Vec<SoundboardSound>> {
        let guild: GuildSounds = HTTP
            .get(format!("{}/guilds/{}/soundboard-sounds", self.base, guild_id))
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let defaults: Vec<SoundboardSound> = HTTP
            .get(format!("{}/soundboard-default-sounds", self.base))
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(guild
            .items
            .into_iter()
            .chain(defaults)
            .filter(|s| s.available)
            .collect())
    }
}

/// Case-insensitive exact match on name; earlier entries win.
pub fn find_sound<'a>(sounds: &'a [SoundboardSound], name: &str) -> Option<&'a SoundboardSound> {
    sounds.iter().find(|s| s.name.eq_ignore_ascii_case(name.trim()))
}

/// Names containing `partial` (case-insensitive), in listing order, deduplicated.
pub fn suggest<'a>(sounds: &'a [SoundboardSound], partial: &str, limit: usize) -> Vec<&'a str> {
    let needle = partial.trim().to_lowercase();
    let mut out: Vec<&str> = Vec::new();
    for sound in sounds {
        if out.len() >= limit {
            break;
        }
        if sound.name.to_lowercase().contains(&needle)
            && !out.iter().any(|n| n.eq_ignore_ascii_case(&sound.name))
        {
            out.push(&sound.name);
        }
    }
    out
}

#[async_trait]
impl SoundboardDispatch for SoundboardClient {
    async fn dispatch(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        name: &str,
    ) -> Result<(), JobError> {
        let sounds = self
            .list(guild_id)
            .await
            .map_err(|e| JobError::Dispatch(format!("listing sounds: {e}")))?;
        let sound = find_sound(&sounds, name)
            .ok_or_else(|| JobError::Dispatch(format!("no soundboard sound named {name:?}")))?;
        debug!(%guild_id, sound_id = %sound.sound_id, "dispatching soundboard sound");

        let body = SendSoundboardSound {
            sound_id: &sound.sound_id,
            source_guild_id: sound.guild_id.as_deref(),
        };
        let resp = HTTP
            .post(format!(
                "{}/channels/{}/send-soundboard-sound",
                self.base, channel_id
            ))
            .header(AUTHORIZATION, &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Dispatch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(JobError::Dispatch(format!("{status}: {detail}")));
        }
        info!(%guild_id, %channel_id, "soundboard sound {name:?} sent");
        Ok(())
    }
}
