use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Instant,
};

use once_cell::sync::Lazy;

pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));

#[derive(Debug)]
pub struct Metrics {
    start: Instant,
    ready: AtomicBool,
    timers_scheduled: AtomicU64,
    jobs_queued: AtomicUsize,
    voice_sessions: AtomicUsize,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

fn saturating_dec(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
        Some(x.saturating_sub(1))
    });
}

impl Metrics {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            ready: AtomicBool::new(false),
            timers_scheduled: AtomicU64::new(0),
            jobs_queued: AtomicUsize::new(0),
            voice_sessions: AtomicUsize::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    pub fn set_ready(&self, v: bool) {
        self.ready.store(v, Ordering::Relaxed);
    }
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn inc_scheduled(&self) {
        self.timers_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queued(&self) {
        self.jobs_queued.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec_queued(&self) {
        saturating_dec(&self.jobs_queued);
    }

    pub fn inc_sessions(&self) {
        self.voice_sessions.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec_sessions(&self) {
        saturating_dec(&self.voice_sessions);
    }

    pub fn inc_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start.elapsed().as_secs(),
            ready: self.is_ready(),
            timers_scheduled: self.timers_scheduled.load(Ordering::Relaxed),
            jobs_queued: self.jobs_queued.load(Ordering::Relaxed),
            voice_sessions: self.voice_sessions.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub ready: bool,
    pub timers_scheduled: u64,
    pub jobs_queued: usize,
    pub voice_sessions: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

impl MetricsSnapshot {
    /// Prometheus-like text exposition.
    pub fn render(&self) -> String {
        format!(
            concat!(
                "# HELP timer_bell_uptime_seconds Seconds since process start\n",
                "# TYPE timer_bell_uptime_seconds counter\n",
                "timer_bell_uptime_seconds {}\n",
                "# HELP timer_bell_ready 1 if the gateway session is ready, 0 otherwise\n",
                "# TYPE timer_bell_ready gauge\n",
                "timer_bell_ready {}\n",
                "# HELP timer_bell_timers_scheduled_total Timers accepted since start\n",
                "# TYPE timer_bell_timers_scheduled_total counter\n",
                "timer_bell_timers_scheduled_total {}\n",
                "# HELP timer_bell_jobs_queued Playback jobs waiting behind a running job\n",
                "# TYPE timer_bell_jobs_queued gauge\n",
                "timer_bell_jobs_queued {}\n",
                "# HELP timer_bell_voice_sessions Open voice sessions\n",
                "# TYPE timer_bell_voice_sessions gauge\n",
                "timer_bell_voice_sessions {}\n",
                "# HELP timer_bell_jobs_completed_total Playback jobs that finished cleanly\n",
                "# TYPE timer_bell_jobs_completed_total counter\n",
                "timer_bell_jobs_completed_total {}\n",
                "# HELP timer_bell_jobs_failed_total Playback jobs that ended in a failure\n",
                "# TYPE timer_bell_jobs_failed_total counter\n",
                "timer_bell_jobs_failed_total {}\n"
            ),
            self.uptime_secs,
            if self.ready { 1 } else { 0 },
            self.timers_scheduled,
            self.jobs_queued,
            self.voice_sessions,
            self.jobs_completed,
            self.jobs_failed,
        )
    }
}
