use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Engine, Halt, RunOutcome, RunStats};
use crate::activity::{ActivityTracker, Clock, SystemClock};
use crate::config::{Settings, SettingsSource};
use crate::consts::{DELAY_BETWEEN_POSTS, MAX_SESSION_DURATION};
use crate::events::{Event, EventBus};
use crate::platform::{Platform, Post};
use crate::reaction::choose_reaction;
use crate::safety::{HumanBehavior, UnsafeReason, check_safety, jittered};

pub struct SchedulerConfig {
    /// Base wait between two posts (jittered).
    pub post_delay: Duration,
    pub max_session: Duration,
    pub behavior: HumanBehavior,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            post_delay: DELAY_BETWEEN_POSTS,
            max_session: MAX_SESSION_DURATION,
            behavior: HumanBehavior::default(),
        }
    }
}

#[derive(Debug)]
struct State {
    tracker: ActivityTracker,
    /// `owner_post` keys reacted to during this process' lifetime.
    processed: HashSet<String>,
}

/// Walks the feed and reacts to posts, one run at a time.
///
/// All mutable state lives here; construct one per process and share it
/// behind an `Arc`. The running flag is the only guard against overlapping
/// runs and is checked, not waited on.
pub struct Scheduler {
    platform: Arc<dyn Platform>,
    settings: Arc<dyn SettingsSource>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
    config: SchedulerConfig,
    running: AtomicBool,
    state: Mutex<State>,
}

/// Clears the running flag however the run ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(
        platform: Arc<dyn Platform>,
        settings: Arc<dyn SettingsSource>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config
            .behavior
            .validate()
            .context("invalid human behavior settings")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let tracker = ActivityTracker::new(clock.now());
        Ok(Self {
            platform,
            settings,
            clock,
            events: None,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(State {
                tracker,
                processed: HashSet::new(),
            }),
        })
    }

    /// Use a different clock (tests). Resets the activity tracker to it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state.get_mut().unwrap().tracker = ActivityTracker::new(clock.now());
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Snapshot of the activity counters.
    pub fn activity(&self) -> ActivityTracker {
        self.state.lock().unwrap().tracker.clone()
    }

    pub fn processed_count(&self) -> usize {
        self.state.lock().unwrap().processed.len()
    }

    fn check(&self, settings: &Settings) -> Result<(), UnsafeReason> {
        let now = self.clock.now();
        let state = self.state.lock().unwrap();
        check_safety(settings, &state.tracker, now, self.config.max_session)
    }

    async fn wait(&self, base: Duration) {
        let delay = {
            let mut rng = rand::rng();
            jittered(base, &mut rng)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Settings-based filters. Returns why the post is left alone.
    fn filtered(settings: &Settings, post: &Post) -> Option<&'static str> {
        if settings.ignore_fanpages && post.page_id.is_some() {
            Some("fan page post")
        } else if settings.ignore_groups && post.group_id.is_some() {
            Some("group post")
        } else if settings.is_blacklisted(&post.owner_id) {
            Some("blacklisted owner")
        } else {
            None
        }
    }

    async fn run(&self) -> Result<RunOutcome> {
        let settings = self.settings.settings().await.context("failed to load settings")?;

        if let Err(reason) = self.check(&settings) {
            log::info!("not running: {reason}");
            return Ok(RunOutcome::Unsafe(reason));
        }

        if let Err(e) = self.platform.authenticate().await {
            log::warn!("authentication failed: {e}");
            return Ok(RunOutcome::AuthFailed);
        }

        let posts = self
            .platform
            .fetch_candidate_posts()
            .await
            .context("failed to fetch feed")?;
        if posts.is_empty() {
            log::info!("no posts found");
            return Ok(RunOutcome::NoPosts);
        }
        log::info!("{} candidate posts", posts.len());

        let mut stats = RunStats::default();

        for post in &posts {
            if !self.running.load(Ordering::SeqCst) {
                log::info!("run stopped");
                stats.halted = Some(Halt::Cancelled);
                break;
            }

            if let Err(reason) = self.check(&settings) {
                log::info!("stopping run: {reason}");
                stats.halted = Some(Halt::Unsafe(reason));
                break;
            }

            let key = post.key();
            if self.state.lock().unwrap().processed.contains(&key) {
                log::debug!("{key}: already processed");
                stats.skipped += 1;
                continue;
            }

            let hesitation = {
                let mut rng = rand::rng();
                self.config.behavior.roll(&mut rng)
            };
            if let Some(pause) = hesitation.pause {
                log::debug!("pausing for {:.1}s", pause.as_secs_f64());
                tokio::time::sleep(pause).await;
            }
            if hesitation.skip {
                log::debug!("{key}: skipped at random");
                stats.skipped += 1;
                continue;
            }

            if let Some(why) = Self::filtered(&settings, post) {
                log::debug!("{key}: skipped ({why})");
                stats.skipped += 1;
                continue;
            }

            stats.examined += 1;
            let counts = match self.platform.fetch_reaction_counts(&post.post_id).await {
                Ok(counts) => counts,
                Err(e) => {
                    log::warn!("{key}: could not read reactions: {e}");
                    stats.failed += 1;
                    self.wait(self.config.post_delay).await;
                    continue;
                }
            };

            match choose_reaction(&counts) {
                None => {
                    log::debug!("{key}: too few reactions ({})", counts.total());
                    stats.skipped += 1;
                }
                Some(reaction) => {
                    match self.platform.execute_reaction(&post.post_id, reaction).await {
                        Ok(()) => {
                            let now = self.clock.now();
                            let (today, hour) = {
                                let mut state = self.state.lock().unwrap();
                                state.processed.insert(key.clone());
                                state.tracker.record_reaction(now);
                                (state.tracker.reactions_today, state.tracker.reactions_this_hour)
                            };
                            log::info!(
                                "{key}: reacted with {reaction} \
                                 ({today}/{} today, {hour}/{} this hour)",
                                settings.max_reactions_day,
                                settings.max_reactions_hour,
                            );
                            stats.reacted += 1;
                            if let Some(events) = &self.events {
                                events.emit(Event::Reacted {
                                    post_key: key,
                                    reaction,
                                });
                            }
                            self.wait(settings.reaction_delay).await;
                        }
                        Err(e) => {
                            log::warn!("{key}: reaction failed: {e}");
                            stats.failed += 1;
                        }
                    }
                }
            }

            self.wait(self.config.post_delay).await;
        }

        Ok(RunOutcome::Finished(stats))
    }

    fn close_expired_session(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        if state
            .tracker
            .close_expired_session(now, self.config.max_session)
        {
            log::info!("session duration exceeded, next run starts a new session");
        }
    }
}

#[async_trait]
impl Engine for Scheduler {
    async fn run_once(&self) -> RunOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("run already in progress, skipping");
            return RunOutcome::AlreadyRunning;
        }

        let outcome = {
            let _guard = RunningGuard(&self.running);
            match self.run().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("run aborted: {e:#}");
                    RunOutcome::Aborted(format!("{e:#}"))
                }
            }
        };

        self.close_expired_session();
        if let RunOutcome::Finished(stats) = &outcome {
            log::info!(
                "run finished: {} reacted, {} skipped, {} failed",
                stats.reacted,
                stats.skipped,
                stats.failed
            );
        }
        outcome
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
