use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use tracing::debug;

use crate::{
    error::JobError,
    soundboard::SoundboardDispatch,
    tones::{self, ToneSequence},
    voice::{CueSource, PlaybackEvents, VoiceSession},
};

/// What to sound when a timer elapses.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCue {
    File(PathBuf),
    Tones(ToneSequence),
    Soundboard { name: String },
}

impl AudioCue {
    /// `file` and `tones`/`beep` are reserved; anything else names a soundboard sound.
    pub fn from_selector(selector: &str, sound_file: &Path) -> Self {
        match selector.to_ascii_lowercase().as_str() {
            "file" => AudioCue::File(sound_file.to_path_buf()),
            "tones" | "beep" => AudioCue::Tones(ToneSequence::alarm()),
            _ => AudioCue::Soundboard {
                name: selector.to_string(),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AudioCue::File(path) => format!("file {}", path.display()),
            AudioCue::Tones(seq) => format!("{} tones", seq.tones.len()),
            AudioCue::Soundboard { name } => format!("soundboard \"{name}\""),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Result of starting a cue.
pub enum Emission {
    /// Local playback; the job waits on these events.
    Playback(PlaybackEvents),
    /// Fire-and-forget remote dispatch with no local completion signal.
    Dispatched,
}

#[async_trait]
pub trait CueRenderer: Send + Sync {
    async fn render(
        &self,
        cue: &AudioCue,
        target: CueTarget,
        session: &mut dyn VoiceSession,
    ) -> Result<Emission, JobError>;
}

pub struct StandardRenderer {
    soundboard: Arc<dyn SoundboardDispatch>,
}

impl StandardRenderer {
    pub fn new(soundboard: Arc<dyn SoundboardDispatch>) -> Self {
        Self { soundboard }
    }
}

#[async_trait]
impl CueRenderer for StandardRenderer {
    async fn render(
        &self,
        cue: &AudioCue,
        target: CueTarget,
        session: &mut dyn VoiceSession,
    ) -> Result<Emission, JobError> {
        match cue {
            AudioCue::File(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(JobError::Playback(format!(
                        "sound file {} not found",
                        path.display()
                    )));
                }
                let events = session.play(CueSource::File(path.clone())).await?;
                Ok(Emission::Playback(events))
            }
            AudioCue::Tones(seq) => {
                let wav = tones::render_wav(seq)
                    .map_err(|e| JobError::Playback(format!("tone synthesis: {e}")))?;
                debug!(
                    bytes = wav.len(),
                    duration = ?seq.total_duration(),
                    "synthesized tone sequence"
                );
                let events = session.play(CueSource::Wav(wav)).await?;
                Ok(Emission::Playback(events))
            }
            AudioCue::Soundboard { name } => {
                self.soundboard
                    .dispatch(target.guild_id, target.channel_id, name)
                    .await?;
                Ok(Emission::Dispatched)
            }
        }
    }
}
