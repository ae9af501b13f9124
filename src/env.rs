use std::{path::PathBuf, time::Duration};

use tracing::warn;

use crate::{cue::AudioCue, error::ConfigError, scheduler::JobTimings};

const TOKEN_KEYS: &[&str] = &["TOKEN", "DISCORD_TOKEN", "DISCORD_BOT_TOKEN", "BOT_TOKEN"];
const APPLICATION_KEYS: &[&str] = &["CLIENT_ID", "APPLICATION_ID"];
const GUILD_KEYS: &[&str] = &["GUILD_ID"];

pub const DEFAULT_MAX_MINUTES: u32 = 150;

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub application_id: u64,
    pub guild_id: u64,
    pub port: u16,
    pub sound_file: PathBuf,
    pub default_cue: String,
    pub max_minutes: u32,
    pub timings: JobTimings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = first_of(&lookup, TOKEN_KEYS)?.1;
        let application_id = parse_id(first_of(&lookup, APPLICATION_KEYS)?)?;
        let guild_id = parse_id(first_of(&lookup, GUILD_KEYS)?)?;

        let defaults = JobTimings::default();
        let timings = JobTimings {
            connect_timeout: secs_or(&lookup, "TIMER_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            emit_cap: secs_or(&lookup, "TIMER_EMIT_CAP_SECS", defaults.emit_cap),
            dispatch_grace: secs_or(&lookup, "TIMER_DISPATCH_GRACE_SECS", defaults.dispatch_grace),
        };

        Ok(Self {
            token,
            application_id,
            guild_id,
            port: parsed_or(&lookup, "PORT", 3000),
            sound_file: lookup("SOUND_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("sound.mp3")),
            default_cue: lookup("DEFAULT_CUE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "file".to_string()),
            max_minutes: parsed_or(&lookup, "TIMER_MAX_MINUTES", DEFAULT_MAX_MINUTES)
                .clamp(1, DEFAULT_MAX_MINUTES),
            timings,
        })
    }

    /// Resolves the value of the `/timer sound` option (or the configured default)
    /// into a concrete cue.
    pub fn cue_for(&self, selector: Option<&str>) -> AudioCue {
        let selector = selector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_cue.as_str());
        AudioCue::from_selector(selector, &self.sound_file)
    }
}

fn first_of<F>(lookup: &F, keys: &'static [&'static str]) -> Result<(&'static str, String), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(val) = lookup(key)
            && !val.trim().is_empty()
        {
            return Ok((*key, val.trim().to_string()));
        }
    }
    Err(ConfigError::Missing(keys))
}

fn parse_id((key, value): (&'static str, String)) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring {key}={raw:?}, using default {default}");
            default
        }),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(parsed_or(lookup, key, default.as_secs()))
}
