//! Scripted stand-ins for the voice, renderer and notifier collaborators.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use tokio::{sync::mpsc, time::Instant};

use super::{JobDeps, JobTimings};
use crate::{
    cue::{AudioCue, CueRenderer, CueTarget, Emission},
    error::{JobError, NotifyError},
    notify::{Notice, Notifier},
    voice::{CueSource, PlaybackEvent, PlaybackEvents, VoiceProvider, VoiceSession},
};

#[derive(Clone, Copy)]
pub(crate) enum Ready {
    After(Duration),
    Never,
    Fails,
}

#[derive(Clone, Copy)]
pub(crate) enum Player {
    IdleAfter(Duration),
    ErrorAfter(Duration),
    Silent,
}

#[derive(Default)]
pub(crate) struct Calls {
    pub(crate) exists: usize,
    pub(crate) opened: usize,
    pub(crate) destroyed: usize,
    pub(crate) notices: Vec<Notice>,
    pub(crate) opened_channels: Vec<ChannelId>,
    pub(crate) timeline: Vec<(&'static str, Instant)>,
}

pub(crate) struct Fake {
    pub(crate) calls: Arc<Mutex<Calls>>,
    pub(crate) channel_present: bool,
    pub(crate) channel_lookup_fails: bool,
    pub(crate) ready: Ready,
    pub(crate) player: Player,
    pub(crate) render_fails: Option<JobError>,
    pub(crate) notify_fails: bool,
}

impl Fake {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::default(),
            channel_present: true,
            channel_lookup_fails: false,
            ready: Ready::After(Duration::from_millis(50)),
            player: Player::IdleAfter(Duration::from_secs(2)),
            render_fails: None,
            notify_fails: false,
        }
    }

    /// Wraps the fake as every collaborator of a job.
    pub(crate) fn into_deps(self, timings: JobTimings) -> (Arc<JobDeps>, Arc<Fake>) {
        let fake = Arc::new(self);
        let shared = Arc::new(SharedFake(fake.clone()));
        let deps = Arc::new(JobDeps {
            voice: shared.clone(),
            renderer: shared.clone(),
            notifier: shared,
            timings,
        });
        (deps, fake)
    }

    pub(crate) fn log(&self, what: &'static str) {
        self.calls.lock().unwrap().timeline.push((what, Instant::now()));
    }
}

struct FakeSession {
    fake: Arc<Fake>,
    destroyed: bool,
}

/// Plays every collaborator role so sessions can point back at the same fake.
pub(crate) struct SharedFake(pub(crate) Arc<Fake>);

#[async_trait]
impl VoiceProvider for SharedFake {
    async fn channel_exists(&self, _: GuildId, _: ChannelId) -> Result<bool, JobError> {
        self.0.calls.lock().unwrap().exists += 1;
        if self.0.channel_lookup_fails {
            return Err(JobError::Connect("channel lookup: 503".into()));
        }
        Ok(self.0.channel_present)
    }

    async fn open(
        &self,
        _: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceSession>, JobError> {
        {
            let mut calls = self.0.calls.lock().unwrap();
            calls.opened += 1;
            calls.opened_channels.push(channel_id);
        }
        self.0.log("open");
        Ok(Box::new(FakeSession {
            fake: self.0.clone(),
            destroyed: false,
        }))
    }
}

#[async_trait]
impl VoiceSession for FakeSession {
    async fn await_ready(&mut self) -> Result<(), JobError> {
        match self.fake.ready {
            Ready::After(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Ready::Never => std::future::pending().await,
            Ready::Fails => Err(JobError::Connect("udp handshake".into())),
        }
    }

    async fn play(&mut self, _source: CueSource) -> Result<PlaybackEvents, JobError> {
        self.fake.log("play");
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(PlaybackEvent::Playing);
        let player = self.fake.player;
        tokio::spawn(async move {
            match player {
                Player::IdleAfter(d) => {
                    tokio::time::sleep(d).await;
                    let _ = tx.send(PlaybackEvent::Idle);
                }
                Player::ErrorAfter(d) => {
                    tokio::time::sleep(d).await;
                    let _ = tx.send(PlaybackEvent::Error("decoder".into()));
                }
                Player::Silent => {
                    // Holding the sender keeps the stream open forever.
                    let _held = tx;
                    std::future::pending::<()>().await;
                }
            }
        });
        Ok(rx)
    }

    async fn destroy(&mut self) {
        if std::mem::replace(&mut self.destroyed, true) {
            return;
        }
        self.fake.calls.lock().unwrap().destroyed += 1;
        self.fake.log("destroy");
    }
}

#[async_trait]
impl CueRenderer for SharedFake {
    async fn render(
        &self,
        cue: &AudioCue,
        _target: CueTarget,
        session: &mut dyn VoiceSession,
    ) -> Result<Emission, JobError> {
        if let Some(e) = self.0.render_fails.clone() {
            return Err(e);
        }
        match cue {
            AudioCue::Soundboard { .. } => {
                self.0.log("dispatch");
                Ok(Emission::Dispatched)
            }
            _ => Ok(Emission::Playback(session.play(CueSource::Wav(Vec::new())).await?)),
        }
    }
}

#[async_trait]
impl Notifier for SharedFake {
    async fn send(&self, _channel_id: ChannelId, notice: Notice) -> Result<(), NotifyError> {
        self.0.calls.lock().unwrap().notices.push(notice);
        self.0.log("notify");
        if self.0.notify_fails {
            Err(NotifyError("403".into()))
        } else {
            Ok(())
        }
    }
}
