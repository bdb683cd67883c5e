//! Configuration structures
//!
//! Everything here is fixed at build time. `Default` reproduces the deployed
//! ACS712 meter; boards override individual fields in their own config module.

use hal_abstractions::Endpoint;

use crate::error::Error;
use crate::retry::RetryPolicy;

/// Peak to RMS ratio of a sinusoid (1/√2, truncated to three places)
pub const PEAK_TO_RMS: f32 = 0.707;

/// Divisor turning `watts × milliseconds` into accumulated watt-hours
///
/// A plain unit conversion would be `3_600 × 1_000`. The deployed meters divide
/// by `3_600_000 / (50 / 3)`, folding in a fixed scale for the sampling duty
/// cycle. Energy totals stay comparable with the fleet only while this value
/// and its integer truncation are kept.
pub const ENERGY_DIVISOR: i64 = 216_000;

/// Earliest epoch accepted as a synchronized clock (2017-11-13T17:07:05Z)
pub const PLAUSIBLE_EPOCH_SECS: u64 = 1_510_592_825;

/// Outbound readings channel
pub const READINGS_TOPIC: &str = "device_energy/readings/acs_000";

/// Inbound control channel
pub const CONTROL_TOPIC: &str = "device_energy/sub";

/// Analog front end and transducer calibration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorCalibration {
    /// ADC full-scale (reference) voltage
    pub reference_volts: f32,
    /// Number of ADC counts spanning the reference voltage
    pub full_scale_count: u16,
    /// Transducer sensitivity, millivolts per ampere
    pub millivolts_per_amp: f32,
    /// Offset subtracted from every RMS current, amperes
    pub error_correction_amps: f32,
    /// Line voltage assumed for power computation
    pub line_volts: f32,
    /// Length of one sampling window
    pub window_ms: u64,
    /// Delay between two conversions inside a window
    pub poll_interval_ms: u32,
}

impl SensorCalibration {
    /// Volts represented by one ADC count
    pub fn adc_resolution(&self) -> f32 {
        self.reference_volts / self.full_scale_count as f32
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.full_scale_count == 0 {
            return Err(Error::InvalidConfig("ADC full-scale count must be non-zero"));
        }
        if !(self.reference_volts > 0.0) {
            return Err(Error::InvalidConfig("ADC reference voltage must be positive"));
        }
        if !(self.millivolts_per_amp > 0.0) {
            return Err(Error::InvalidConfig("transducer sensitivity must be positive"));
        }
        if self.window_ms == 0 {
            return Err(Error::InvalidConfig("sampling window must be non-zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("polling interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            reference_volts: 3.3,
            full_scale_count: 1024,
            millivolts_per_amp: 100.0, // ACS712 20 A module
            error_correction_amps: 0.035,
            line_volts: 240.0,
            window_ms: 1000,
            poll_interval_ms: 10,
        }
    }
}

/// Constants of the integration law
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IntegratorConstants {
    pub peak_to_rms: f32,
    pub energy_divisor: i64,
}

impl Default for IntegratorConstants {
    fn default() -> Self {
        Self {
            peak_to_rms: PEAK_TO_RMS,
            energy_divisor: ENERGY_DIVISOR,
        }
    }
}

/// Time base configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeConfig {
    /// Results at or below this epoch are treated as "not synced yet"
    pub plausibility_threshold: u64,
    /// Minimum age of the time anchor before `refresh` queries the network
    pub refresh_interval_ms: u64,
    /// Offset added to every published timestamp
    pub utc_offset_secs: i32,
    /// Schedule for `resync`
    pub retry: RetryPolicy,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            plausibility_threshold: PLAUSIBLE_EPOCH_SECS,
            refresh_interval_ms: 60_000,
            utc_offset_secs: 0,
            retry: RetryPolicy::forever(500),
        }
    }
}

/// Connection sequence configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectivityConfig {
    /// Broker endpoint
    pub endpoint: Endpoint<'static>,
    /// Session client identifier
    pub client_id: &'static str,
    /// Schedule for polling the link while joining
    pub join_retry: RetryPolicy,
    /// Schedule for session connect attempts
    pub session_retry: RetryPolicy,
    /// Subscribe to the control channel once the session is up
    pub subscribe_control: bool,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                host: "iot.example.com",
                port: 8883,
            },
            client_id: "energy-meter",
            join_retry: RetryPolicy::forever(500),
            session_retry: RetryPolicy::forever(500),
            subscribe_control: true,
        }
    }
}

/// Publication channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublisherConfig {
    pub readings_topic: &'static str,
    pub control_topic: &'static str,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            readings_topic: READINGS_TOPIC,
            control_topic: CONTROL_TOPIC,
        }
    }
}

/// Complete device configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    pub calibration: SensorCalibration,
    pub integrator: IntegratorConstants,
    pub time: TimeConfig,
    pub connectivity: ConnectivityConfig,
    pub publisher: PublisherConfig,
    /// Pause after every cycle
    pub cycle_delay_ms: u32,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.calibration.validate()?;
        if self.integrator.energy_divisor == 0 {
            return Err(Error::InvalidConfig("energy divisor must be non-zero"));
        }
        if self.connectivity.client_id.is_empty() {
            return Err(Error::InvalidConfig("client id must not be empty"));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            calibration: SensorCalibration::default(),
            integrator: IntegratorConstants::default(),
            time: TimeConfig::default(),
            connectivity: ConnectivityConfig::default(),
            publisher: PublisherConfig::default(),
            cycle_delay_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.calibration.full_scale_count, 1024);
        assert_eq!(config.integrator.energy_divisor, 216_000);
        assert_eq!(config.connectivity.endpoint.port, 8883);
        assert_eq!(config.publisher.readings_topic, "device_energy/readings/acs_000");
        assert_eq!(config.cycle_delay_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_adc_resolution() {
        let calibration = SensorCalibration::default();
        assert!((calibration.adc_resolution() - 3.3 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_bad_calibration() {
        let mut calibration = SensorCalibration::default();
        calibration.millivolts_per_amp = 0.0;
        assert!(matches!(calibration.validate(), Err(Error::InvalidConfig(_))));

        let mut calibration = SensorCalibration::default();
        calibration.window_ms = 0;
        assert!(matches!(calibration.validate(), Err(Error::InvalidConfig(_))));

        let mut config = DeviceConfig::default();
        config.integrator.energy_divisor = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
