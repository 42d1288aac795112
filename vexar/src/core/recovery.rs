//! Crash counting with time-based decay
//!
//! Pure bookkeeping: the supervisor decides what an exit means, this module
//! only answers "restart or give up".

use std::time::Duration;

use tokio::time::Instant;

/// Automatic restarts allowed inside one crash window
pub const MAX_CRASH_COUNT: u32 = 3;

/// A crash this long after the previous one starts a fresh window
pub const CRASH_DECAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashVerdict {
    /// Schedule restart number `attempt` (1-based)
    Restart { attempt: u32 },
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct CrashTracker {
    count: u32,
    last_crash: Option<Instant>,
    max_count: u32,
    decay: Duration,
}

impl CrashTracker {
    pub fn new(max_count: u32, decay: Duration) -> Self {
        Self {
            count: 0,
            last_crash: None,
            max_count,
            decay,
        }
    }

    /// Account for an unexpected exit observed at `now`
    pub fn record_crash(&mut self, now: Instant) -> CrashVerdict {
        if let Some(last) = self.last_crash {
            if now.saturating_duration_since(last) > self.decay {
                self.count = 0;
            }
        }

        if self.count < self.max_count {
            self.count += 1;
            self.last_crash = Some(now);
            CrashVerdict::Restart {
                attempt: self.count,
            }
        } else {
            CrashVerdict::GiveUp
        }
    }

    /// The process stayed up long enough to count as stable
    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn last_crash(&self) -> Option<Instant> {
        self.last_crash
    }
}

impl Default for CrashTracker {
    fn default() -> Self {
        Self::new(MAX_CRASH_COUNT, CRASH_DECAY)
    }
}
