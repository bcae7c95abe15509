//! Periodic and on-demand triggering of an [`Engine`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

use super::{Engine, RunOutcome};
use crate::consts::TIMER_INITIAL_DELAY;

/// Fires runs on a fixed period and whenever a [`TriggerHandle`] asks.
///
/// Each run is spawned, so a trigger that lands during an active run reaches
/// the engine and is dropped by its running flag rather than queued.
pub struct Timer {
    engine: Arc<dyn Engine>,
    period: Duration,
    initial_delay: Duration,
    trigger: Arc<Notify>,
}

/// Cloneable handle for ad hoc runs.
#[derive(Clone)]
pub struct TriggerHandle(Arc<Notify>);

impl TriggerHandle {
    pub fn fire(&self) {
        self.0.notify_one();
    }
}

impl Timer {
    pub fn new(engine: Arc<dyn Engine>, period: Duration) -> Self {
        Self {
            engine,
            period,
            initial_delay: TIMER_INITIAL_DELAY,
            trigger: Arc::new(Notify::new()),
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn handle(&self) -> TriggerHandle {
        TriggerHandle(Arc::clone(&self.trigger))
    }

    /// Keep firing until `shutdown` resolves, then stop the active run.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticks = tokio::time::interval_at(Instant::now() + self.initial_delay, self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        log::info!(
            "timer started: every {} min",
            self.period.as_secs() / 60
        );

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    log::debug!("timer fired");
                    self.spawn_run();
                }
                _ = self.trigger.notified() => {
                    log::debug!("run triggered");
                    self.spawn_run();
                }
                _ = &mut shutdown => {
                    self.engine.stop();
                    log::info!("timer stopped");
                    break;
                }
            }
        }
    }

    fn spawn_run(&self) {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let RunOutcome::Aborted(reason) = engine.run_once().await {
                log::warn!("run aborted: {reason}");
            }
        });
    }
}
