use std::{
    collections::{HashMap, VecDeque},
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
};

use futures_util::{FutureExt, future::BoxFuture};
use serenity::all::GuildId;
use tracing::{debug, error, warn};

use crate::{error::JobError, metrics::METRICS};

/// One unit of per-guild work. Its outcome is only logged; the queue advances
/// either way.
pub type Job = BoxFuture<'static, Result<(), JobError>>;

#[derive(Default)]
struct GuildQueue {
    pending: VecDeque<Job>,
    running: bool,
}

/// Per-guild FIFO of jobs with at most one job in flight per guild. Guilds
/// never wait on each other.
#[derive(Clone, Default)]
pub struct GuildQueues {
    inner: Arc<Mutex<HashMap<GuildId, GuildQueue>>>,
}

impl GuildQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GuildId, GuildQueue>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `job` and returns immediately. Starts a drain task if the guild
    /// was idle.
    pub fn submit(&self, guild_id: GuildId, job: Job) {
        // Check-and-mark happens under one lock so two submitters can't both
        // believe they are first.
        let start = {
            let mut queues = self.lock();
            let queue = queues.entry(guild_id).or_default();
            queue.pending.push_back(job);
            METRICS.inc_queued();
            !std::mem::replace(&mut queue.running, true)
        };

        if start {
            debug!(%guild_id, "guild queue idle, starting drain");
            tokio::spawn(self.clone().drain(guild_id));
        } else {
            debug!(%guild_id, pending = self.pending(guild_id), "job queued behind running job");
        }
    }

    /// Takes the next job, or marks the guild idle when nothing is left.
    fn advance(&self, guild_id: GuildId) -> Option<Job> {
        let mut queues = self.lock();
        let queue = queues.get_mut(&guild_id)?;
        match queue.pending.pop_front() {
            Some(job) => {
                METRICS.dec_queued();
                Some(job)
            }
            None => {
                queue.running = false;
                None
            }
        }
    }

    async fn drain(self, guild_id: GuildId) {
        while let Some(job) = self.advance(guild_id) {
            match AssertUnwindSafe(job).catch_unwind().await {
                Ok(Ok(())) => {
                    METRICS.inc_completed();
                    debug!(%guild_id, "job finished");
                }
                Ok(Err(e)) => {
                    METRICS.inc_failed();
                    warn!(%guild_id, kind = e.kind(), "job failed: {e}");
                }
                Err(_) => {
                    METRICS.inc_failed();
                    error!(%guild_id, "job panicked; advancing queue");
                }
            }
        }
    }

    /// Jobs waiting behind the one in flight.
    pub fn pending(&self, guild_id: GuildId) -> usize {
        self.lock()
            .get(&guild_id)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_busy(&self, guild_id: GuildId) -> bool {
        self.lock().get(&guild_id).is_some_and(|q| q.running)
    }
}
