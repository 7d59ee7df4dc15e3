//! Fixed-interval polling loop.
//!
//! The scheduler runs its job once immediately, then again every `interval`,
//! checking on a short tick. A cycle that returns an error or panics is logged
//! and followed by a cooldown; the loop only ends when stopped through a
//! [`SchedulerHandle`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::panic_message;

/// How often the loop wakes up to check whether a cycle is due.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Pause after a failed cycle before the loop resumes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Work executed on every scheduler cycle.
#[async_trait]
pub trait PollJob: Send + Sync {
    async fn run_cycle(&self) -> anyhow::Result<()>;
}

/// Stops a running [`Scheduler`]. Cheap to clone.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Request the loop to exit. The cycle in progress, if any, finishes first.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

pub struct Scheduler {
    interval: Duration,
    tick: Duration,
    cooldown: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            interval,
            tick: DEFAULT_TICK,
            cooldown: DEFAULT_COOLDOWN,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn with_timing(mut self, tick: Duration, cooldown: Duration) -> Self {
        self.tick = tick;
        self.cooldown = cooldown;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run `job` until stopped. Returns the number of cycles started.
    pub async fn run<J: PollJob + ?Sized>(&self, job: &J) -> u64 {
        let mut shutdown = self.shutdown.subscribe();
        let mut cycles = 0u64;
        let mut next_run = Instant::now();

        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        while !*shutdown.borrow_and_update() {
            let pause = if Instant::now() >= next_run {
                cycles += 1;
                let pause = match AssertUnwindSafe(job.run_cycle()).catch_unwind().await {
                    Ok(Ok(())) => self.tick,
                    Ok(Err(e)) => {
                        tracing::error!(cycle = cycles, error = %e, "Queue cycle failed");
                        self.cooldown
                    }
                    Err(payload) => {
                        tracing::error!(
                            cycle = cycles,
                            error = %panic_message(&*payload),
                            "Queue cycle panicked"
                        );
                        self.cooldown
                    }
                };
                next_run = Instant::now() + self.interval;
                pause
            } else {
                self.tick
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!(cycles, "Scheduler stopped");
        cycles
    }
}
