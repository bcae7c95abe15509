//! Startup banner and run summary display.

use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};
use crate::engine::RunOutcome;

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub api: &'a str,
    pub db: &'a str,
    pub plan: &'a str,
    pub interval_minutes: u64,
    pub max_per_hour: u32,
    pub max_per_day: u32,
}

/// Print the startup banner with session info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║          A U T O R E A C T            ║
   ║    follow the crowd, one post at a    ║
   ║              time                     ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   bridge    {}
   database  {}
   plan      {}
   interval  every {} min
   caps      {}/hour, {}/day
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.api,
        info.db,
        info.plan,
        info.interval_minutes,
        format_number(info.max_per_hour.into()),
        format_number(info.max_per_day.into()),
    );
}

/// One-line description of how a run ended.
pub fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::AlreadyRunning => "a run is already in progress".to_string(),
        RunOutcome::Unsafe(reason) => format!("paused: {reason}"),
        RunOutcome::AuthFailed => "authentication failed".to_string(),
        RunOutcome::NoPosts => "no posts found".to_string(),
        RunOutcome::Finished(stats) => format!(
            "{} reacted, {} skipped, {} failed",
            format_number(stats.reacted as u64),
            format_number(stats.skipped as u64),
            format_number(stats.failed as u64),
        ),
        RunOutcome::Aborted(reason) => format!("aborted: {reason}"),
    }
}
