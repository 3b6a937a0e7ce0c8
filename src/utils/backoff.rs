//! Exponential backoff between connection attempts.

use std::time::Duration;

/// Exponential backoff iterator
///
/// Yields `initial`, then doubles on every step, until `limit` delays have
/// been produced. Delays never exceed `ceiling`.
#[derive(Debug, Clone)]
pub struct Backoff {
    produced: u32,
    limit: u32,
    multiplier: u32,
    current: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, limit: u32) -> Self {
        Self {
            produced: 0,
            limit,
            multiplier: 2,
            current: initial,
            ceiling: Duration::from_secs(60),
        }
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.produced >= self.limit {
            return None;
        }
        self.produced += 1;

        let delay = self.current.min(self.ceiling);
        self.current = self.current.saturating_mul(self.multiplier);
        Some(delay)
    }
}
