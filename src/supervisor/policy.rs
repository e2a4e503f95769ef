//! Reconnect policy - bounded exponential backoff with jitter

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Delay sequence between reconnect attempts
///
/// Delays grow by `multiplier` up to `max_delay`, each randomized by
/// `jitter`. Once `max_attempts` consecutive attempts have been handed out,
/// [`next_delay`](Self::next_delay) returns `None`. A successful open
/// resets the sequence.
pub struct ReconnectBackoff {
    inner: ExponentialBackoff,
    attempts: u32,
    max_attempts: Option<u32>,
}

impl ReconnectBackoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        let mut inner = ExponentialBackoff {
            current_interval: config.initial_delay,
            initial_interval: config.initial_delay,
            randomization_factor: config.jitter.clamp(0.0, 1.0),
            multiplier: config.multiplier.max(1.0),
            max_interval: config.max_delay.max(config.initial_delay),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        inner.reset();

        ReconnectBackoff {
            inner,
            attempts: 0,
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before the next attempt, or `None` when the cap is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        self.attempts += 1;
        self.inner.next_backoff()
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.inner.reset();
    }

    /// Attempts handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}
