//! One timer firing, from channel check to voice teardown.
//!
//! ```text
//! Pending -> ChannelCheck -> Connecting -> Ready -> Emitting -> Cooldown -> Destroyed
//!                 \______________\___________\________\---> Failed -----^
//! ```
//!
//! The voice session is opened at most once and destroyed exactly once on
//! every path that opened it. Errors never escape as panics; they become a
//! message to the requester and a `JobError` for the queue's log.

use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use super::{JobDeps, ScheduledTimer};
use crate::{
    cue::{CueTarget, Emission},
    error::JobError,
    notify::Notice,
    voice::{PlaybackEvent, PlaybackEvents, VoiceSession},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    ChannelCheck,
    Connecting,
    Ready,
    Emitting,
    Cooldown,
    Failed,
    Destroyed,
}

/// How an `Emitting` phase came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitEnd {
    /// Player reported idle, or its event stream closed.
    Finished,
    /// Dispatch-only cue; waited out the grace interval.
    GraceElapsed,
    /// Hit the hard cap with no idle/error.
    ForcedByCap,
}

pub struct PlaybackJob {
    timer: ScheduledTimer,
    deps: Arc<JobDeps>,
    state: JobState,
    history: Vec<JobState>,
    /// Set once the time's-up notice has gone out; it is then the only
    /// message the requester gets.
    announced: bool,
}

impl PlaybackJob {
    pub fn new(timer: ScheduledTimer, deps: Arc<JobDeps>) -> Self {
        Self {
            timer,
            deps,
            state: JobState::Pending,
            history: vec![JobState::Pending],
            announced: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state visited so far, in order.
    #[cfg(test)]
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    fn transition(&mut self, next: JobState) {
        debug!(
            guild_id = %self.timer.guild_id,
            from = ?self.state,
            to = ?next,
            "playback job transition"
        );
        self.state = next;
        self.history.push(next);
    }

    /// Runs the job to a terminal state. The requester gets exactly one
    /// message: the time's-up notice once emission started, otherwise the
    /// failure notice.
    pub async fn run(mut self) -> Result<(), JobError> {
        let outcome = self.execute().await;
        if let Err(e) = &outcome {
            self.transition(JobState::Failed);
            warn!(
                guild_id = %self.timer.guild_id,
                channel_id = %self.timer.channel_id,
                kind = e.kind(),
                "timer playback failed: {e}"
            );
            if !self.announced {
                self.notify(Notice::plain(e.user_message())).await;
            }
        } else {
            info!(
                guild_id = %self.timer.guild_id,
                channel_id = %self.timer.channel_id,
                "timer playback finished"
            );
        }
        self.transition(JobState::Destroyed);
        outcome
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        let (guild_id, channel_id) = (self.timer.guild_id, self.timer.channel_id);

        self.transition(JobState::ChannelCheck);
        if !self.deps.voice.channel_exists(guild_id, channel_id).await? {
            return Err(JobError::ChannelGone);
        }

        self.transition(JobState::Connecting);
        let mut session = self.deps.voice.open(guild_id, channel_id).await?;
        let result = self.with_session(session.as_mut()).await;
        session.destroy().await;
        result
    }

    async fn with_session(&mut self, session: &mut dyn VoiceSession) -> Result<(), JobError> {
        let connect_timeout = self.deps.timings.connect_timeout;
        match timeout(connect_timeout, session.await_ready()).await {
            Ok(ready) => ready?,
            Err(_) => return Err(JobError::ConnectTimeout(connect_timeout)),
        }
        self.transition(JobState::Ready);

        let target = CueTarget {
            guild_id: self.timer.guild_id,
            channel_id: self.timer.channel_id,
        };
        let emission = self
            .deps
            .renderer
            .render(&self.timer.payload.cue, target, session)
            .await?;

        self.transition(JobState::Emitting);
        let cap_deadline = Instant::now() + self.deps.timings.emit_cap;
        // Only announce once something audible has actually started.
        self.notify(Notice::times_up(self.timer.payload.role)).await;
        self.announced = true;

        let end = match emission {
            Emission::Playback(events) => wait_for_player(events, cap_deadline).await?,
            Emission::Dispatched => {
                let grace_end = (Instant::now() + self.deps.timings.dispatch_grace).min(cap_deadline);
                tokio::time::sleep_until(grace_end).await;
                if grace_end == cap_deadline {
                    EmitEnd::ForcedByCap
                } else {
                    EmitEnd::GraceElapsed
                }
            }
        };
        if end == EmitEnd::ForcedByCap {
            warn!(
                guild_id = %self.timer.guild_id,
                "cue still active after {:?}, forcing teardown",
                self.deps.timings.emit_cap
            );
        }

        self.transition(JobState::Cooldown);
        Ok(())
    }

    async fn notify(&self, notice: Notice) {
        if let Err(e) = self
            .deps
            .notifier
            .send(self.timer.notify_channel, notice)
            .await
        {
            debug!(guild_id = %self.timer.guild_id, "{e}");
        }
    }
}

/// Waits for the player to go idle or fail, bounded by `deadline`.
async fn wait_for_player(mut events: PlaybackEvents, deadline: Instant) -> Result<EmitEnd, JobError> {
    let watch = async {
        while let Some(event) = events.recv().await {
            match event {
                PlaybackEvent::Playing => debug!("cue playing"),
                PlaybackEvent::Idle => return Ok(EmitEnd::Finished),
                PlaybackEvent::Error(reason) => return Err(JobError::Playback(reason)),
            }
        }
        // Player dropped without reporting; treat as finished.
        Ok(EmitEnd::Finished)
    };
    let cap = deadline.saturating_duration_since(Instant::now());
    match timeout(cap, watch).await {
        Ok(end) => end,
        Err(_) => Ok(EmitEnd::ForcedByCap),
    }
}

/// Timings for the voice lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimings {
    pub connect_timeout: Duration,
    pub emit_cap: Duration,
    pub dispatch_grace: Duration,
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            emit_cap: Duration::from_secs(30),
            dispatch_grace: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use serenity::all::{ChannelId, GuildId, RoleId};

    use super::*;
    use crate::{
        cue::AudioCue,
        scheduler::{
            TimerPayload,
            testing::{Fake, Player, Ready},
        },
        tones::ToneSequence,
    };

    fn timer(cue: AudioCue, role: Option<RoleId>) -> ScheduledTimer {
        ScheduledTimer {
            guild_id: GuildId::new(10),
            channel_id: ChannelId::new(20),
            notify_channel: ChannelId::new(30),
            fire_at: Instant::now(),
            payload: TimerPayload { cue, role },
        }
    }

    fn tones() -> AudioCue {
        AudioCue::Tones(ToneSequence::alarm())
    }

    fn job_for(fake: Fake, timer: ScheduledTimer) -> (PlaybackJob, Arc<Fake>) {
        let (deps, fake) = fake.into_deps(JobTimings::default());
        (PlaybackJob::new(timer, deps), fake)
    }

    fn elapsed_between(fake: &Fake, from: &str, to: &str) -> Duration {
        let calls = fake.calls.lock().unwrap();
        let find = |what: &str| {
            calls
                .timeline
                .iter()
                .find(|(w, _)| *w == what)
                .map(|(_, at)| *at)
                .unwrap()
        };
        find(to) - find(from)
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_visits_every_state() {
        let (mut job, fake) = job_for(Fake::new(), timer(tones(), None));
        assert_eq!(job.state(), JobState::Pending);

        let outcome = job.execute().await;
        assert!(outcome.is_ok());
        assert_eq!(
            job.history(),
            &[
                JobState::Pending,
                JobState::ChannelCheck,
                JobState::Connecting,
                JobState::Ready,
                JobState::Emitting,
                JobState::Cooldown,
            ]
        );
        let calls = fake.calls.lock().unwrap();
        assert_eq!((calls.opened, calls.destroyed), (1, 1));
        assert_eq!(calls.notices, vec![Notice::times_up(None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn role_is_pinged_after_playback_starts() {
        let role = RoleId::new(77);
        let (job, fake) = job_for(Fake::new(), timer(tones(), Some(role)));
        job.run().await.unwrap();

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.notices.len(), 1);
        assert_eq!(calls.notices[0].mention_role, Some(role));
        let order: Vec<_> = calls.timeline.iter().map(|(w, _)| *w).collect();
        assert_eq!(order, vec!["open", "play", "notify", "destroy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_channel_never_opens_a_session() {
        let fake = Fake {
            channel_present: false,
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), Some(RoleId::new(1))));
        assert_eq!(job.run().await, Err(JobError::ChannelGone));

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.exists, 1);
        assert_eq!(calls.opened, 0);
        assert_eq!(calls.destroyed, 0);
        assert_eq!(calls.notices, vec![Notice::plain(JobError::ChannelGone.user_message())]);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_tears_down_after_twenty_seconds() {
        let fake = Fake {
            ready: Ready::Never,
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), None));
        let started = Instant::now();
        let outcome = job.run().await;

        assert_eq!(outcome, Err(JobError::ConnectTimeout(Duration::from_secs(20))));
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_millis(20_100));
        let calls = fake.calls.lock().unwrap();
        assert_eq!((calls.opened, calls.destroyed), (1, 1));
        assert_eq!(calls.notices.len(), 1);
        assert_eq!(calls.notices[0].mention_role, None);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_error_is_reported_once() {
        let fake = Fake {
            ready: Ready::Fails,
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), Some(RoleId::new(3))));
        let outcome = job.run().await;

        assert!(matches!(outcome, Err(JobError::Connect(_))));
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.destroyed, 1);
        assert_eq!(
            calls.notices,
            vec![Notice::plain("⚠️ Could not join the voice channel.")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_player_is_cut_off_at_the_cap() {
        let fake = Fake {
            player: Player::Silent,
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), None));
        job.run().await.unwrap();

        let held = elapsed_between(&fake, "play", "destroy");
        assert!(held >= Duration::from_secs(30), "released early: {held:?}");
        assert!(held < Duration::from_millis(30_100), "released late: {held:?}");
        assert_eq!(fake.calls.lock().unwrap().destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn player_error_after_announcing_sends_no_second_message() {
        let fake = Fake {
            player: Player::ErrorAfter(Duration::from_secs(1)),
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), None));
        let outcome = job.run().await;

        assert_eq!(outcome, Err(JobError::Playback("decoder".into())));
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.destroyed, 1);
        assert_eq!(calls.notices, vec![Notice::times_up(None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatched_cue_waits_out_the_grace_interval() {
        let cue = AudioCue::Soundboard { name: "airhorn".into() };
        let (job, fake) = job_for(Fake::new(), timer(cue, None));
        job.run().await.unwrap();

        let held = elapsed_between(&fake, "dispatch", "destroy");
        assert!(held >= Duration::from_secs(3));
        assert!(held < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_failure_tears_down() {
        let fake = Fake {
            render_fails: Some(JobError::Dispatch("missing permission".into())),
            ..Fake::new()
        };
        let cue = AudioCue::Soundboard { name: "airhorn".into() };
        let (job, fake) = job_for(fake, timer(cue, Some(RoleId::new(5))));
        let outcome = job.run().await;

        assert!(matches!(outcome, Err(JobError::Dispatch(_))));
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.destroyed, 1);
        assert_eq!(calls.notices.len(), 1);
        assert_eq!(calls.notices[0].mention_role, None);
    }

    #[tokio::test(start_paused = true)]
    async fn notify_failure_is_not_fatal() {
        let fake = Fake {
            notify_fails: true,
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), Some(RoleId::new(8))));
        assert!(job.run().await.is_ok());
        assert_eq!(fake.calls.lock().unwrap().destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_check_failure_stops_before_connecting() {
        let fake = Fake {
            channel_present: false,
            ..Fake::new()
        };
        let (mut job, _fake) = job_for(fake, timer(tones(), None));
        let outcome = job.execute().await;
        assert!(outcome.is_err());
        assert_eq!(job.state(), JobState::ChannelCheck);
        assert!(!job.history().contains(&JobState::Connecting));
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_before_announcing_sends_failure_notice() {
        let fake = Fake {
            render_fails: Some(JobError::Playback("sound file missing".into())),
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), Some(RoleId::new(9))));
        assert!(job.run().await.is_err());

        let calls = fake.calls.lock().unwrap();
        assert_eq!(
            calls.notices,
            vec![Notice::plain(JobError::Playback(String::new()).user_message())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn channel_lookup_error_is_not_reported_as_gone() {
        let fake = Fake {
            channel_lookup_fails: true,
            ..Fake::new()
        };
        let (job, fake) = job_for(fake, timer(tones(), None));
        let outcome = job.run().await;

        assert!(matches!(outcome, Err(JobError::Connect(_))));
        let calls = fake.calls.lock().unwrap();
        assert_eq!((calls.opened, calls.destroyed), (0, 0));
        assert_eq!(
            calls.notices,
            vec![Notice::plain("⚠️ Could not join the voice channel.")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fake_session_teardown_is_idempotent() {
        let (deps, fake) = Fake::new().into_deps(JobTimings::default());
        let mut session = deps
            .voice
            .open(GuildId::new(1), ChannelId::new(2))
            .await
            .unwrap();
        session.destroy().await;
        session.destroy().await;
        assert_eq!(fake.calls.lock().unwrap().destroyed, 1);
    }
}
