//! Time base
//!
//! Keeps a wall-clock anchor (epoch seconds at a known monotonic instant)
//! obtained from a network time source, and derives the current epoch from
//! the monotonic clock in between syncs.
//!
//! `resync` blocks until the source returns a plausible time. With the default
//! unbounded retry policy a permanently unreachable time source stalls the
//! caller forever; the deployed firmware behaves the same way. Hardened
//! deployments can configure a bounded [`RetryPolicy`](crate::retry::RetryPolicy).

mod calendar;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{MonotonicClock, TimeSource};

use crate::config::TimeConfig;
use crate::error::{Error, Operation};
use crate::retry::Retry;

pub use calendar::{CivilDateTime, Weekday};

/// Epoch seconds observed at a monotonic instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Anchor {
    epoch_secs: u64,
    mono_millis: u64,
}

impl Anchor {
    fn epoch_at(&self, mono_millis: u64) -> u64 {
        self.epoch_secs
            .saturating_add(mono_millis.saturating_sub(self.mono_millis) / 1000)
    }
}

/// Network-synchronized wall clock
pub struct TimeBase<S> {
    source: S,
    config: TimeConfig,
    anchor: Option<Anchor>,
    last_attempt_millis: u64,
}

impl<S: TimeSource> TimeBase<S> {
    pub fn new(source: S, config: TimeConfig) -> Self {
        Self {
            source,
            config,
            anchor: None,
            last_attempt_millis: 0,
        }
    }

    /// `true` once at least one resync has completed
    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Current epoch seconds, including the configured UTC offset
    pub fn now<C: MonotonicClock>(&self, clock: &C) -> Result<u64, Error> {
        let anchor = self.anchor.ok_or(Error::TimeNotSynced)?;
        let utc = anchor.epoch_at(clock.now_millis());
        Ok(utc.saturating_add_signed(self.config.utc_offset_secs as i64))
    }

    /// Block until the network time source yields a plausible time
    ///
    /// # Arguments
    ///
    /// * `clock` - monotonic clock the new anchor is taken against
    /// * `delay` - waits between failed attempts
    ///
    /// # Errors
    ///
    /// `RetriesExhausted(TimeSync)` once a bounded retry policy runs out.
    /// Never returns an error with the default unbounded policy.
    pub async fn resync<C, D>(&mut self, clock: &C, delay: &mut D) -> Result<u64, Error>
    where
        C: MonotonicClock,
        D: DelayNs,
    {
        info!("Setting time using SNTP");
        let mut retry = Retry::new(self.config.retry, Operation::TimeSync);
        loop {
            if let Some(epoch) = self.query(clock).await {
                info!(
                    "Time synchronized after {} retries: {}",
                    retry.failures(),
                    CivilDateTime::from_unix(epoch)
                );
                return Ok(epoch);
            }
            trace!("Waiting for time...");
            retry.backoff(delay).await?;
        }
    }

    /// Re-anchor if the current anchor is older than the refresh interval
    ///
    /// Makes a single request. On failure the existing anchor is kept and the
    /// next attempt waits another full interval. Returns `true` when the anchor
    /// was replaced.
    pub async fn refresh<C: MonotonicClock>(&mut self, clock: &C) -> bool {
        if self.anchor.is_none() {
            return false;
        }
        let now = clock.now_millis();
        if now.saturating_sub(self.last_attempt_millis) < self.config.refresh_interval_ms {
            return false;
        }

        let previous = self.anchor;
        match self.query(clock).await {
            Some(epoch) => {
                if let Some(previous) = previous {
                    let expected = previous.epoch_at(clock.now_millis());
                    if epoch < expected {
                        warn!("Time base stepped back by {} s", expected - epoch);
                    }
                }
                debug!("Time base refreshed: {}", epoch);
                true
            }
            None => {
                warn!("Time refresh failed, keeping previous anchor");
                false
            }
        }
    }

    /// One request; anchors and returns the time when it is plausible
    async fn query<C: MonotonicClock>(&mut self, clock: &C) -> Option<u64> {
        self.last_attempt_millis = clock.now_millis();
        match self.source.request_time().await {
            Ok(epoch) if epoch > self.config.plausibility_threshold => {
                self.anchor = Some(Anchor {
                    epoch_secs: epoch,
                    mono_millis: clock.now_millis(),
                });
                Some(epoch)
            }
            Ok(epoch) => {
                debug!("Implausible time {} (threshold {})", epoch, self.config.plausibility_threshold);
                None
            }
            Err(e) => {
                debug!("Time request failed: {:?}", e);
                None
            }
        }
    }
}
