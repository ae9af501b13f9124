pub mod delay;
pub mod job;
pub mod queue;
#[cfg(test)]
pub(crate) mod testing;

use std::{sync::Arc, time::Duration};

use serenity::all::{ChannelId, GuildId, RoleId};
use tokio::time::Instant;
use tracing::info;

pub use delay::DelayScheduler;
pub use job::{JobState, JobTimings, PlaybackJob};
pub use queue::GuildQueues;

use crate::{
    cue::{AudioCue, CueRenderer},
    metrics::METRICS,
    notify::Notifier,
    voice::VoiceProvider,
};

/// Collaborators shared by every playback job.
pub struct JobDeps {
    pub voice: Arc<dyn VoiceProvider>,
    pub renderer: Arc<dyn CueRenderer>,
    pub notifier: Arc<dyn Notifier>,
    pub timings: JobTimings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerPayload {
    pub cue: AudioCue,
    pub role: Option<RoleId>,
}

/// An accepted `/timer` waiting to fire. Consumed exactly once, when it is
/// turned into a queued job.
#[derive(Debug)]
pub struct ScheduledTimer {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Text channel that receives the time's-up and failure messages.
    pub notify_channel: ChannelId,
    pub fire_at: Instant,
    pub payload: TimerPayload,
}

#[derive(Debug, Clone)]
pub struct TimerRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub notify_channel: ChannelId,
    pub delay: Duration,
    pub cue: AudioCue,
    pub role: Option<RoleId>,
}

/// Owns all timer and queue state for the process. Handlers reach it through
/// `AppState`, never through a global.
pub struct TimerScheduler {
    queues: GuildQueues,
    delay: DelayScheduler,
    deps: Arc<JobDeps>,
}

impl TimerScheduler {
    pub fn new(deps: JobDeps) -> Self {
        Self::with_deps(Arc::new(deps))
    }

    fn with_deps(deps: Arc<JobDeps>) -> Self {
        Self {
            queues: GuildQueues::new(),
            delay: DelayScheduler::new(),
            deps,
        }
    }

    #[cfg(test)]
    pub fn queues(&self) -> &GuildQueues {
        &self.queues
    }

    /// Arms a timer; when it elapses a playback job joins the guild's queue.
    /// Returns the instant the timer fires.
    pub fn submit_timer(&self, request: TimerRequest) -> Instant {
        let timer = ScheduledTimer {
            guild_id: request.guild_id,
            channel_id: request.channel_id,
            notify_channel: request.notify_channel,
            fire_at: Instant::now() + request.delay,
            payload: TimerPayload {
                cue: request.cue,
                role: request.role,
            },
        };
        info!(
            guild_id = %timer.guild_id,
            channel_id = %timer.channel_id,
            cue = %timer.payload.cue.describe(),
            "timer armed for {:?}",
            request.delay
        );
        METRICS.inc_scheduled();

        let queues = self.queues.clone();
        let deps = self.deps.clone();
        let fire_at = timer.fire_at;
        self.delay.schedule_at(fire_at, move || {
            let guild_id = timer.guild_id;
            info!(%guild_id, channel_id = %timer.channel_id, "timer elapsed, queueing playback");
            queues.submit(guild_id, Box::pin(PlaybackJob::new(timer, deps).run()));
        })
    }
}
