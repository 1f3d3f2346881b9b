//! Capture rate accounting

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window over which [`RateCounter::rate`] is measured
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Shared counter of completed captures
///
/// Incremented once per capture attempt by any number of workers and read
/// by anything that reports progress.
#[derive(Debug, Default)]
pub struct RateCounter {
    total: AtomicU64,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed capture
    pub fn increment(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.push_back(now);
        prune(&mut recent, now);
    }

    /// Captures completed during the last second
    pub fn rate(&self) -> u64 {
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        prune(&mut recent, Instant::now());
        recent.len() as u64
    }

    /// Captures completed since the counter was created
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

fn prune(recent: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = recent.front() {
        if now.duration_since(*oldest) > RATE_WINDOW {
            recent.pop_front();
        } else {
            break;
        }
    }
}
