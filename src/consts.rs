//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Posts with fewer total reactions than this are left alone.
pub const MIN_REACTIONS: u32 = 10;

/// A winning "like" above this count makes a popular alternative preferable.
pub const MAX_LIKE_COUNT: u32 = 5;

/// Base wait between two posts of the same run (jittered).
pub const DELAY_BETWEEN_POSTS: Duration = Duration::from_secs(2);

/// Longest a session may stay open before the scheduler backs off.
pub const MAX_SESSION_DURATION: Duration = Duration::from_secs(60 * 60);

/// Lower and upper bound of the jitter factor applied to every delay.
pub const JITTER_MIN: f64 = 0.7;
pub const JITTER_MAX: f64 = 1.3;

/// Local hours (start inclusive, end exclusive) allowed in working-hours mode.
pub const WORKING_HOURS: (u32, u32) = (9, 18);

/// Length of the free trial.
pub const TRIAL_DAYS: i64 = 3;

/// Reaction caps per plan, as (per hour, per day).
pub const PRO_LIMITS: (u32, u32) = (50, 500);
pub const TRIAL_LIMITS: (u32, u32) = (20, 100);
pub const FREE_LIMITS: (u32, u32) = (5, 10);

/// Delay before the periodic timer fires for the first time.
pub const TIMER_INITIAL_DELAY: Duration = Duration::from_secs(60);

/// Default database path: `~/.autoreact/autoreact.db`.
/// Single DB for settings and license state.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".autoreact")
        .join("autoreact.db")
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
