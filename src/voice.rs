use std::{path::PathBuf, sync::Arc};

use serenity::{
    Error as SerenityError,
    all::{Cache, ChannelId, GuildId, Http},
    async_trait,
    http::HttpError,
};
use songbird::{
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
    input::Input,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::{error::JobError, metrics::METRICS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Playing,
    Idle,
    Error(String),
}

pub type PlaybackEvents = mpsc::UnboundedReceiver<PlaybackEvent>;

/// Audio handed to a voice session for local playback.
#[derive(Debug, Clone)]
pub enum CueSource {
    File(PathBuf),
    /// An in-memory WAV container.
    Wav(Vec<u8>),
}

/// Opens voice sessions. One session per job; the job destroys it.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// `Ok(false)` only when the channel is known to be gone; lookup
    /// failures are errors.
    async fn channel_exists(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, JobError>;

    async fn open(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceSession>, JobError>;
}

#[async_trait]
pub trait VoiceSession: Send {
    /// Resolves once the connection is usable. Callers bound it with a timeout.
    async fn await_ready(&mut self) -> Result<(), JobError>;

    async fn play(&mut self, source: CueSource) -> Result<PlaybackEvents, JobError>;

    /// Must be safe to call more than once and must never fail.
    async fn destroy(&mut self);
}

const UNKNOWN_CHANNEL: isize = 10003;

/// Only a 404 or Discord's "Unknown Channel" code means the channel is gone.
fn channel_missing(status: u16, discord_code: isize) -> bool {
    status == 404 || discord_code == UNKNOWN_CHANNEL
}

pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    http: Arc<Http>,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>, http: Arc<Http>) -> Self {
        Self {
            manager,
            cache,
            http,
        }
    }
}

#[async_trait]
impl VoiceProvider for SongbirdVoice {
    async fn channel_exists(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, JobError> {
        let cached = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.channels.contains_key(&channel_id));
        if let Some(found) = cached {
            return Ok(found);
        }

        // Guild not cached; ask the API instead.
        match self.http.get_channel(channel_id).await {
            Ok(_) => Ok(true),
            Err(SerenityError::Http(HttpError::UnsuccessfulRequest(resp)))
                if channel_missing(resp.status_code.as_u16(), resp.error.code) =>
            {
                debug!(%guild_id, %channel_id, "channel lookup: unknown channel");
                Ok(false)
            }
            Err(e) => Err(JobError::Connect(format!("channel lookup: {e}"))),
        }
    }

    async fn open(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceSession>, JobError> {
        if self.manager.get(guild_id).is_some() {
            warn!(%guild_id, "stale voice call found, replacing it");
            let _ = self.manager.remove(guild_id).await;
        }
        let call = self.manager.get_or_insert(guild_id);
        METRICS.inc_sessions();
        info!(%guild_id, %channel_id, "opening voice session");
        Ok(Box::new(SongbirdSession {
            manager: self.manager.clone(),
            call,
            guild_id,
            channel_id,
            destroyed: false,
        }))
    }
}

struct SongbirdSession {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    guild_id: GuildId,
    channel_id: ChannelId,
    destroyed: bool,
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    async fn await_ready(&mut self) -> Result<(), JobError> {
        self.manager
            .join(self.guild_id, self.channel_id)
            .await
            .map(|_| ())
            .map_err(|e| JobError::Connect(e.to_string()))
    }

    async fn play(&mut self, source: CueSource) -> Result<PlaybackEvents, JobError> {
        let input: Input = match source {
            CueSource::File(path) => songbird::input::File::new(path).into(),
            CueSource::Wav(bytes) => Input::from(Box::<[u8]>::from(bytes)),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut call = self.call.lock().await;
        let handle = call.play_only_input(input);
        drop(call);

        for (event, kind) in [
            (TrackEvent::Play, ForwardKind::Playing),
            (TrackEvent::End, ForwardKind::Idle),
            (TrackEvent::Error, ForwardKind::Error),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackForwarder {
                        tx: tx.clone(),
                        kind,
                    },
                )
                .map_err(|e| JobError::Playback(format!("track events: {e}")))?;
        }
        Ok(rx)
    }

    async fn destroy(&mut self) {
        if std::mem::replace(&mut self.destroyed, true) {
            return;
        }
        METRICS.dec_sessions();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!(guild_id = %self.guild_id, "voice teardown: {e}");
        }
        info!(guild_id = %self.guild_id, "voice session destroyed");
    }
}

#[derive(Clone, Copy)]
enum ForwardKind {
    Playing,
    Idle,
    Error,
}

/// Turns songbird track callbacks into `PlaybackEvent`s on a channel.
struct TrackForwarder {
    tx: mpsc::UnboundedSender<PlaybackEvent>,
    kind: ForwardKind,
}

#[async_trait]
impl VoiceEventHandler for TrackForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let event = match self.kind {
            ForwardKind::Playing => PlaybackEvent::Playing,
            ForwardKind::Idle => PlaybackEvent::Idle,
            ForwardKind::Error => {
                let reason = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_else(|| "unknown track error".to_string()),
                    _ => "unknown track error".to_string(),
                };
                PlaybackEvent::Error(reason)
            }
        };
        let _ = self.tx.send(event);
        None
    }
}
