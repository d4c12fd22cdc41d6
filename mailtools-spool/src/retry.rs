//! Exponential backoff for deferred spool entries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Generation at which an entry is dead-lettered instead of deferred.
    ///
    /// Default: 10
    #[serde(default = "defaults::max_generations")]
    pub max_generations: u32,

    /// Base delay for exponential backoff (in seconds). Generation `n` waits
    /// `base * 2^n` seconds.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::base_delay_secs")]
    pub base_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_generations: defaults::max_generations(),
            base_delay_secs: defaults::base_delay_secs(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry may move on to `generation`, rather than being
    /// dead-lettered.
    #[must_use]
    pub const fn should_retry(&self, generation: u32) -> bool {
        generation < self.max_generations
    }

    /// Seconds to wait before attempting an entry at `generation`.
    #[must_use]
    pub const fn delay_for(&self, generation: u32) -> u64 {
        let factor = match 1u64.checked_shl(generation) {
            Some(factor) => factor,
            None => u64::MAX,
        };
        self.base_delay_secs.saturating_mul(factor)
    }

    /// Epoch at which an entry deferred into `generation` at `now` becomes
    /// due.
    #[must_use]
    pub const fn next_attempt_at(&self, now: u64, generation: u32) -> u64 {
        now.saturating_add(self.delay_for(generation))
    }
}

mod defaults {
    pub const fn max_generations() -> u32 {
        10
    }

    pub const fn base_delay_secs() -> u64 {
        60
    }
}
