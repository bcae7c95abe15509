//! Reaction counters and session bookkeeping.
//!
//! All times are local wall-clock times: the daily counter rolls over at
//! local midnight, which is what a person using the account would see.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeDelta};

/// Source of "now". Swapped for [`ManualClock`] in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

/// How much the account has reacted recently.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTracker {
    pub reactions_today: u32,
    pub reactions_this_hour: u32,
    pub session_start: Option<DateTime<Local>>,
    pub last_activity: Option<DateTime<Local>>,
    /// The local date `reactions_today` belongs to.
    pub daily_reset: NaiveDate,
}

impl ActivityTracker {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            reactions_today: 0,
            reactions_this_hour: 0,
            session_start: None,
            last_activity: None,
            daily_reset: now.date_naive(),
        }
    }

    /// Reactions counted against today's cap at `now`, after day rollover.
    pub fn today_count(&self, now: DateTime<Local>) -> u32 {
        if now.date_naive() != self.daily_reset {
            0
        } else {
            self.reactions_today
        }
    }

    /// Reactions counted against the hourly cap at `now`, after the hourly reset.
    pub fn hour_count(&self, now: DateTime<Local>) -> u32 {
        if self.hour_window_expired(now) {
            0
        } else {
            self.reactions_this_hour
        }
    }

    fn hour_window_expired(&self, now: DateTime<Local>) -> bool {
        match self.last_activity {
            None => true,
            Some(last) => now.signed_duration_since(last) > TimeDelta::hours(1),
        }
    }

    /// Book one successful reaction at `now`.
    pub fn record_reaction(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today != self.daily_reset {
            self.reactions_today = 0;
            self.daily_reset = today;
        }

        if self.hour_window_expired(now) {
            self.reactions_this_hour = 0;
        }

        self.reactions_today += 1;
        self.reactions_this_hour += 1;
        self.last_activity = Some(now);

        if self.session_start.is_none() {
            self.session_start = Some(now);
        }
    }

    /// Whether an open session has run longer than `max`.
    pub fn session_expired(&self, now: DateTime<Local>, max: Duration) -> bool {
        let max = TimeDelta::from_std(max).unwrap_or(TimeDelta::MAX);
        match self.session_start {
            Some(start) => now.signed_duration_since(start) > max,
            None => false,
        }
    }

    /// Close the session if it outlived `max`. Returns whether it did.
    pub fn close_expired_session(&mut self, now: DateTime<Local>, max: Duration) -> bool {
        if self.session_expired(now, max) {
            self.session_start = None;
            true
        } else {
            false
        }
    }
}
