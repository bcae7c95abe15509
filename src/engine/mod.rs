pub mod scheduler;
pub mod timer;

use async_trait::async_trait;

use crate::safety::UnsafeReason;

/// Why a run stopped before reaching the end of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The running flag was cleared from outside.
    Cancelled,
    /// A throttling rule started failing mid-run.
    Unsafe(UnsafeReason),
}

/// Tally of one run over the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Posts whose reaction counts were requested.
    pub examined: usize,
    pub reacted: usize,
    /// Posts passed over: already handled, filtered, or not worth a reaction.
    pub skipped: usize,
    /// Count fetches or reactions that failed.
    pub failed: usize,
    pub halted: Option<Halt>,
}

/// How a call to [`Engine::run_once`] ended. Runs never fail outward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
    /// Throttled before touching the platform.
    Unsafe(UnsafeReason),
    AuthFailed,
    NoPosts,
    Finished(RunStats),
    /// An unexpected error ended the run early.
    Aborted(String),
}

/// The outermost boundary. main.rs and the timer only know this trait.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Go over the feed once. A call made while a run is active is a no-op.
    async fn run_once(&self) -> RunOutcome;

    /// Ask the active run to stop at the next post.
    fn stop(&self);

    fn is_running(&self) -> bool;
}
