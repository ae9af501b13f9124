use std::time::Duration;

use anyhow::{Result, anyhow};
use serenity::all::{
    CommandDataOptionValue, CommandInteraction, CommandOptionType, Context as SerenityContext,
    CreateAllowedMentions, CreateAutocompleteResponse, CreateCommand, CreateCommandOption,
    CreateInteractionResponse, CreateInteractionResponseMessage, RoleId,
};
use tracing::{debug, info};

use crate::{
    scheduler::TimerRequest,
    soundboard,
    state::AppState,
};

pub const NAME: &str = "timer";

// Discord caps autocomplete responses at 25 choices.
const MAX_CHOICES: usize = 25;

const BUILTIN_CUES: &[(&str, &str)] = &[("🔔 Sound file", "file"), ("🎹 Beep tones", "tones")];

pub fn definition(max_minutes: u32) -> CreateCommand {
    let minutes = CreateCommandOption::new(
        CommandOptionType::Integer,
        "minutes",
        format!("Minutes to wait (1-{max_minutes})"),
    )
    .required(true)
    .min_int_value(1)
    .max_int_value(max_minutes.into());
    let role = CreateCommandOption::new(
        CommandOptionType::Role,
        "role",
        "Role to mention when time is up",
    )
    .required(false);
    let sound = CreateCommandOption::new(
        CommandOptionType::String,
        "sound",
        "What to play: the sound file, beep tones, or a soundboard sound",
    )
    .required(false)
    .set_autocomplete(true);

    CreateCommand::new(NAME)
        .description("Set a timer; the bot rings in your voice channel when it is up")
        .add_option(minutes)
        .add_option(role)
        .add_option(sound)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerOptions {
    pub minutes: u32,
    pub role: Option<RoleId>,
    pub sound: Option<String>,
}

impl TimerOptions {
    /// Validates raw option values; the error is the reply for the user.
    pub fn parse(
        minutes: Option<i64>,
        role: Option<RoleId>,
        sound: Option<&str>,
        max_minutes: u32,
    ) -> Result<Self, String> {
        let minutes = minutes.ok_or_else(|| "❌ Please give the number of minutes.".to_string())?;
        if minutes < 1 || minutes > i64::from(max_minutes) {
            return Err(format!("❌ Minutes must be between 1 and {max_minutes}."));
        }
        Ok(Self {
            minutes: minutes as u32,
            role,
            sound: sound.map(str::trim).filter(|s| !s.is_empty()).map(String::from),
        })
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes) * 60)
    }

    pub fn acknowledgement(&self, fires_at_unix: i64) -> String {
        let unit = if self.minutes == 1 { "minute" } else { "minutes" };
        let mut text = format!(
            "⏳ Timer set for **{} {unit}** (rings <t:{fires_at_unix}:R>).",
            self.minutes
        );
        if let Some(role) = self.role {
            text.push_str(&format!(" Will ping <@&{role}> when time is up."));
        }
        text
    }
}

fn reply(content: impl Into<String>) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .allowed_mentions(CreateAllowedMentions::new()),
    )
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    let mut minutes = None;
    let mut role = None;
    let mut sound = None;
    for opt in &cmd.data.options {
        match (opt.name.as_str(), &opt.value) {
            ("minutes", CommandDataOptionValue::Integer(v)) => minutes = Some(*v),
            ("role", CommandDataOptionValue::Role(r)) => role = Some(*r),
            ("sound", CommandDataOptionValue::String(s)) => sound = Some(s.as_str()),
            _ => {}
        }
    }

    let options = match TimerOptions::parse(minutes, role, sound, state.config.max_minutes) {
        Ok(options) => options,
        Err(msg) => {
            cmd.create_response(&ctx.http, reply(msg)).await?;
            return Ok(());
        }
    };

    let guild_id = cmd.guild_id.ok_or_else(|| anyhow!("not in a guild"))?;
    let voice_channel = ctx.cache.guild(guild_id).and_then(|guild| {
        guild
            .voice_states
            .get(&cmd.user.id)
            .and_then(|vs| vs.channel_id)
    });
    let Some(channel_id) = voice_channel else {
        cmd.create_response(&ctx.http, reply("❌ Join a voice channel first!"))
            .await?;
        return Ok(());
    };

    let delay = options.delay();
    let fires_at = chrono::Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
    cmd.create_response(&ctx.http, reply(options.acknowledgement(fires_at.timestamp())))
        .await?;

    let cue = state.config.cue_for(options.sound.as_deref());
    info!(
        %guild_id,
        %channel_id,
        user = %cmd.user.id,
        minutes = options.minutes,
        "/timer accepted"
    );
    state.scheduler.submit_timer(TimerRequest {
        guild_id,
        channel_id,
        notify_channel: cmd.channel_id,
        delay,
        cue,
        role: options.role,
    });
    Ok(())
}

/// Built-in cue choices whose label or value contains `partial`.
pub fn builtin_choices(partial: &str) -> Vec<(&'static str, &'static str)> {
    let needle = partial.trim().to_lowercase();
    BUILTIN_CUES
        .iter()
        .filter(|(label, value)| {
            value.contains(&needle) || label.to_lowercase().contains(&needle)
        })
        .copied()
        .collect()
}

pub async fn autocomplete(
    ctx: &SerenityContext,
    cmd: &CommandInteraction,
    state: &AppState,
) -> Result<()> {
    let partial = cmd
        .data
        .autocomplete()
        .map(|opt| opt.value.to_string())
        .unwrap_or_default();

    let mut response = CreateAutocompleteResponse::new();
    let builtins = builtin_choices(&partial);
    let room = MAX_CHOICES - builtins.len();
    for (label, value) in builtins {
        response = response.add_string_choice(label, value);
    }

    if let Some(guild_id) = cmd.guild_id {
        match state.soundboard.list(guild_id).await {
            Ok(sounds) => {
                for name in soundboard::suggest(&sounds, &partial, room) {
                    response = response.add_string_choice(format!("🔊 {name}"), name);
                }
            }
            Err(e) => debug!(%guild_id, "soundboard listing for autocomplete failed: {e}"),
        }
    }

    cmd.create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;
    Ok(())
}
