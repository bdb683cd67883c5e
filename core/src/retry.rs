//! Retry scheduling for the blocking connection steps
//!
//! The deployed firmware retries every blocking step forever at a fixed
//! interval. That remains the default ([`RetryPolicy::forever`]); a bounded or
//! backing-off schedule has to be asked for explicitly.

use embedded_hal_async::delay::DelayNs;

use crate::error::{Error, Operation};

/// How often and how long to retry a blocking step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Wait after the first failed attempt
    pub delay_ms: u32,
    /// Total attempts allowed; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Multiplier applied to the wait after every failure (1 = fixed interval)
    pub backoff_factor: u32,
    /// Upper bound for the wait when backing off
    pub max_delay_ms: u32,
}

impl RetryPolicy {
    /// Fixed interval, no upper bound on attempts
    pub const fn forever(delay_ms: u32) -> Self {
        Self {
            delay_ms,
            max_attempts: None,
            backoff_factor: 1,
            max_delay_ms: delay_ms,
        }
    }

    /// Fixed interval, at most `max_attempts` attempts
    pub const fn bounded(delay_ms: u32, max_attempts: u32) -> Self {
        Self {
            delay_ms,
            max_attempts: Some(max_attempts),
            backoff_factor: 1,
            max_delay_ms: delay_ms,
        }
    }

    /// Multiply the wait by `factor` after every failure, capped at `max_delay_ms`
    pub const fn with_backoff(mut self, factor: u32, max_delay_ms: u32) -> Self {
        self.backoff_factor = factor;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub const fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none()
    }

    /// Wait before retry number `retry` (0 = after the first failure)
    pub fn delay_for(&self, retry: u32) -> u32 {
        if self.backoff_factor <= 1 {
            return self.delay_ms;
        }
        let mut delay = self.delay_ms;
        for _ in 0..retry {
            delay = delay.saturating_mul(self.backoff_factor);
            if delay >= self.max_delay_ms {
                return self.max_delay_ms;
            }
        }
        delay.min(self.max_delay_ms)
    }
}

/// Attempt counter for one run of a blocking step
pub struct Retry {
    policy: RetryPolicy,
    operation: Operation,
    failures: u32,
}

impl Retry {
    pub fn new(policy: RetryPolicy, operation: Operation) -> Self {
        Self {
            policy,
            operation,
            failures: 0,
        }
    }

    /// Failed attempts so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt and wait for the next one
    ///
    /// Returns `Error::RetriesExhausted` without waiting once the policy has no
    /// attempts left.
    pub async fn backoff<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.failures = self.failures.saturating_add(1);
        if let Some(max) = self.policy.max_attempts {
            if self.failures >= max {
                return Err(Error::RetriesExhausted(self.operation));
            }
        }
        delay.delay_ms(self.policy.delay_for(self.failures - 1)).await;
        Ok(())
    }
}
