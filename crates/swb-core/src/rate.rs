use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window over performed deletions.
///
/// Sliding rather than fixed-bucket so a burst straddling a bucket boundary
/// cannot be admitted twice. The window is global across all chats: one
/// budget for the whole process.
#[derive(Debug, Default)]
pub struct RateLimiter {
    deletions: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether another deletion fits in the trailing window. Prunes stale
    /// entries but records nothing.
    pub fn can_delete(&mut self, max_per_minute: u32) -> bool {
        self.can_delete_at(max_per_minute, Instant::now())
    }

    pub fn can_delete_at(&mut self, max_per_minute: u32, now: Instant) -> bool {
        self.prune(now);
        (self.deletions.len() as u32) < max_per_minute
    }

    /// Record a performed deletion. Called exactly once per successful
    /// delete, never on failure or skip.
    pub fn record_deletion(&mut self) {
        self.record_deletion_at(Instant::now());
    }

    pub fn record_deletion_at(&mut self, now: Instant) {
        self.deletions.push_back(now);
    }

    /// Deletions within the trailing window, without mutating the log.
    pub fn current_rate(&self) -> u32 {
        self.current_rate_at(Instant::now())
    }

    pub fn current_rate_at(&self, now: Instant) -> u32 {
        self.deletions
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .count() as u32
    }

    /// Operator escape hatch: forget the whole window.
    pub fn reset(&mut self) {
        self.deletions.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.deletions.front() {
            if now.duration_since(*front) >= WINDOW {
                self.deletions.pop_front();
            } else {
                break;
            }
        }
    }
}
