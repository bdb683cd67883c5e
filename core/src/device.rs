//! Device cycle
//!
//! Owns every piece of mutable state (energy accumulator, time anchor,
//! connection stage) and runs the measurement loop:
//!
//! 1. refresh the time base
//! 2. sample one window and integrate it into a reading
//! 3. check session health, re-running the connection sequence if needed
//! 4. publish the reading when the session was healthy
//! 5. pause before the next cycle
//!
//! Everything runs in the caller's execution context, one step after the
//! other. Nothing here is shared, so no locking is involved.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{AnalogInput, Credentials, MonotonicClock, NetworkLink, PubSubSession, TimeSource};

use crate::config::DeviceConfig;
use crate::energy::{EnergyIntegrator, Reading};
use crate::error::Error;
use crate::network::{
    ConnectionState, ConnectivityManager, ControlHandler, LossReason, Publisher,
};
use crate::sensor::SignalSampler;
use crate::time::TimeBase;

/// Board resources handed to the device
pub struct DeviceParts<A, C, D, L, T, S, H> {
    pub adc: A,
    pub clock: C,
    pub delay: D,
    pub link: L,
    pub time_source: T,
    pub session: S,
    pub control: H,
    pub credentials: Credentials<'static>,
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome {
    /// Reading sent
    Published(Reading),
    /// Session refused the reading; it is dropped
    PublishFailed { reading: Reading, error: Error },
    /// Session was not healthy; the connection sequence ran instead of publishing
    Resequenced,
}

/// The telemetry device
pub struct Device<A, C, D, L, T, S, H> {
    adc: A,
    clock: C,
    delay: D,
    link: L,
    session: S,
    control: H,
    time: TimeBase<T>,
    sampler: SignalSampler,
    integrator: EnergyIntegrator,
    connectivity: ConnectivityManager,
    publisher: Publisher,
    cycle_delay_ms: u32,
}

impl<A, C, D, L, T, S, H> Device<A, C, D, L, T, S, H>
where
    A: AnalogInput,
    C: MonotonicClock,
    D: DelayNs,
    L: NetworkLink,
    T: TimeSource,
    S: PubSubSession,
    H: ControlHandler,
{
    /// Assemble a device from its capabilities
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the calibration, integrator constants or client
    /// id are unusable.
    pub fn new(parts: DeviceParts<A, C, D, L, T, S, H>, config: DeviceConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            adc: parts.adc,
            clock: parts.clock,
            delay: parts.delay,
            link: parts.link,
            session: parts.session,
            control: parts.control,
            time: TimeBase::new(parts.time_source, config.time),
            sampler: SignalSampler::new(&config.calibration),
            integrator: EnergyIntegrator::new(&config.calibration, config.integrator),
            connectivity: ConnectivityManager::new(
                config.connectivity,
                config.publisher.control_topic,
                parts.credentials,
            ),
            publisher: Publisher::new(&config.publisher),
            cycle_delay_ms: config.cycle_delay_ms,
        })
    }

    /// Bring the connection up before the first cycle
    pub async fn start(&mut self) -> Result<(), Error> {
        info!("Starting energy meter");
        self.connectivity
            .drive(
                &mut self.link,
                &mut self.time,
                &mut self.session,
                &self.clock,
                &mut self.delay,
            )
            .await
    }

    /// One full cycle, including the trailing pause
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, Error> {
        let outcome = self.cycle().await;
        self.delay.delay_ms(self.cycle_delay_ms).await;
        outcome
    }

    async fn cycle(&mut self) -> Result<CycleOutcome, Error> {
        self.time.refresh(&self.clock).await;

        let peak_to_peak = self
            .sampler
            .sample(&mut self.adc, &self.clock, &mut self.delay)
            .await;

        let reading = match self.time.now(&self.clock) {
            Ok(timestamp) => Some(self.integrator.integrate(
                peak_to_peak,
                self.clock.now_millis(),
                timestamp,
            )),
            Err(_) => {
                self.connectivity.mark_lost(LossReason::TimeUnavailable);
                None
            }
        };

        let healthy = self
            .connectivity
            .check_health(&self.link, &mut self.session, &mut self.control)
            .await;

        let reading = match reading {
            Some(reading) if healthy => reading,
            _ => {
                warn!("Session not connected, re-running connection sequence");
                self.connectivity
                    .drive(
                        &mut self.link,
                        &mut self.time,
                        &mut self.session,
                        &self.clock,
                        &mut self.delay,
                    )
                    .await?;
                return Ok(CycleOutcome::Resequenced);
            }
        };

        match self.publisher.publish(&mut self.session, &reading).await {
            Ok(()) => {
                info!(
                    "Published reading {}: {} A, {} W, {} Wh",
                    reading.timestamp,
                    reading.rms_current_amps,
                    reading.power_watts,
                    reading.energy_watt_hours
                );
                Ok(CycleOutcome::Published(reading))
            }
            Err(error) => {
                warn!("Publish failed: {:?}", error);
                Ok(CycleOutcome::PublishFailed { reading, error })
            }
        }
    }

    /// Run forever
    pub async fn run(&mut self) -> ! {
        while let Err(e) = self.start().await {
            error!("Startup connection failed: {:?}", e);
            self.delay.delay_ms(self.cycle_delay_ms).await;
        }

        loop {
            if let Err(e) = self.run_cycle().await {
                error!("Cycle failed: {:?}", e);
            }
        }
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.connectivity.state()
    }

    pub fn energy_watt_hours(&self) -> i64 {
        self.integrator.energy_watt_hours()
    }

    pub fn time_base(&self) -> &TimeBase<T> {
        &self.time
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn control_handler(&self) -> &H {
        &self.control
    }
}
