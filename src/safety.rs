//! Throttling rules that keep the scheduler within its configured pace.

use std::fmt;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Local, Timelike, Weekday};
use rand::RngExt;

use crate::activity::ActivityTracker;
use crate::config::Settings;
use crate::consts::{JITTER_MAX, JITTER_MIN, WORKING_HOURS};

/// Why the scheduler must not react right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeReason {
    OutsideWorkingHours,
    Weekend,
    DailyLimit,
    HourlyLimit,
    SessionTooLong,
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnsafeReason::OutsideWorkingHours => "outside working hours",
            UnsafeReason::Weekend => "weekend",
            UnsafeReason::DailyLimit => "daily reaction limit reached",
            UnsafeReason::HourlyLimit => "hourly reaction limit reached",
            UnsafeReason::SessionTooLong => "session duration limit reached",
        };
        f.write_str(text)
    }
}

/// Check every throttling rule; the first one that fails is returned.
///
/// Counters are read as of `now`, so a new day or an idle hour lifts the
/// matching cap before the next reaction is recorded.
pub fn check_safety(
    settings: &Settings,
    tracker: &ActivityTracker,
    now: DateTime<Local>,
    max_session: Duration,
) -> Result<(), UnsafeReason> {
    if settings.working_hours_only {
        let (start, end) = WORKING_HOURS;
        if !(start..end).contains(&now.hour()) {
            return Err(UnsafeReason::OutsideWorkingHours);
        }
    }

    if settings.weekdays_only && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return Err(UnsafeReason::Weekend);
    }

    if tracker.today_count(now) >= settings.max_reactions_day {
        return Err(UnsafeReason::DailyLimit);
    }

    if tracker.hour_count(now) >= settings.max_reactions_hour {
        return Err(UnsafeReason::HourlyLimit);
    }

    if tracker.session_expired(now, max_session) {
        return Err(UnsafeReason::SessionTooLong);
    }

    Ok(())
}

pub fn is_safe_to_operate(
    settings: &Settings,
    tracker: &ActivityTracker,
    now: DateTime<Local>,
    max_session: Duration,
) -> bool {
    check_safety(settings, tracker, now, max_session).is_ok()
}

/// Scale `base` by a uniform factor in `[0.7, 1.3]`.
pub fn jittered<R: RngExt>(base: Duration, rng: &mut R) -> Duration {
    let factor = rng.random_range(JITTER_MIN..=JITTER_MAX);
    base.mul_f64(factor)
}

/// Random pauses and skips sprinkled over a run.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanBehavior {
    pub pause_chance: f64,
    pub pause_min: Duration,
    pub pause_max: Duration,
    pub skip_chance: f64,
}

impl Default for HumanBehavior {
    fn default() -> Self {
        Self {
            pause_chance: 0.10,
            pause_min: Duration::from_secs(10),
            pause_max: Duration::from_secs(30),
            skip_chance: 0.15,
        }
    }
}

/// Outcome of one [`HumanBehavior::roll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hesitation {
    /// Extra pause to take before looking at the post.
    pub pause: Option<Duration>,
    /// Leave this post alone.
    pub skip: bool,
}

impl HumanBehavior {
    /// Never pause, never skip.
    pub fn disabled() -> Self {
        Self {
            pause_chance: 0.0,
            skip_chance: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, p) in [("pause", self.pause_chance), ("skip", self.skip_chance)] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{name} chance must be within [0, 1], got {p}");
            }
        }
        if self.pause_min > self.pause_max {
            bail!("pause_min must not exceed pause_max");
        }
        Ok(())
    }

    /// Independent rolls for the pause and the skip.
    pub fn roll<R: RngExt>(&self, rng: &mut R) -> Hesitation {
        let pause = rng.random_bool(self.pause_chance).then(|| {
            let secs = rng
                .random_range(self.pause_min.as_secs_f64()..=self.pause_max.as_secs_f64());
            Duration::from_secs_f64(secs)
        });
        let skip = rng.random_bool(self.skip_chance);
        Hesitation { pause, skip }
    }
}
