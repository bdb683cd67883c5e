//! Power derivation and energy integration
//!
//! Turns a window's peak-to-peak voltage into RMS current and power, and
//! integrates power over the monotonic clock into a watt-hour total.
//!
//! The total is an integer and every increment is truncated toward zero before
//! it is added. The resulting bias is part of how the deployed meters count and
//! must not be replaced by floating-point accumulation.

use crate::config::{IntegratorConstants, SensorCalibration};

/// One published measurement
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Seconds since the Unix epoch (plus the configured offset)
    pub timestamp: u64,
    /// RMS current after offset correction; negative under no load
    pub rms_current_amps: f32,
    /// Instantaneous power at the assumed line voltage
    pub power_watts: i32,
    /// Energy accumulated since process start
    pub energy_watt_hours: i64,
}

/// Round half away from zero
fn round_to_i32(value: f32) -> i32 {
    if value >= 0.0 {
        (value + 0.5) as i32
    } else {
        (value - 0.5) as i32
    }
}

/// Energy integrator
///
/// Owns the watt-hour accumulator and the monotonic instant of the previous
/// cycle. Both live as long as the integrator; a process restart starts again
/// from zero.
pub struct EnergyIntegrator {
    millivolts_per_amp: f32,
    error_correction_amps: f32,
    line_volts: f32,
    constants: IntegratorConstants,
    baseline_millis: Option<u64>,
    energy_watt_hours: i64,
}

impl EnergyIntegrator {
    pub fn new(calibration: &SensorCalibration, constants: IntegratorConstants) -> Self {
        Self {
            millivolts_per_amp: calibration.millivolts_per_amp,
            error_correction_amps: calibration.error_correction_amps,
            line_volts: calibration.line_volts,
            constants,
            baseline_millis: None,
            energy_watt_hours: 0,
        }
    }

    /// RMS current for a peak-to-peak voltage, offset corrected, not clamped
    pub fn rms_current(&self, peak_to_peak_volts: f32) -> f32 {
        let rms_volts = (peak_to_peak_volts / 2.0) * self.constants.peak_to_rms;
        (rms_volts * 1000.0) / self.millivolts_per_amp - self.error_correction_amps
    }

    /// Power at the assumed line voltage, rounded to whole watts
    pub fn power(&self, rms_current_amps: f32) -> i32 {
        round_to_i32(rms_current_amps * self.line_volts)
    }

    /// Derive a reading and fold its energy into the accumulator
    ///
    /// The first call only records `now_millis` as the baseline: with no
    /// previous instant there is nothing to integrate.
    pub fn integrate(&mut self, peak_to_peak_volts: f32, now_millis: u64, timestamp: u64) -> Reading {
        let rms_current_amps = self.rms_current(peak_to_peak_volts);
        let power_watts = self.power(rms_current_amps);

        match self.baseline_millis {
            None => {
                debug!("First reading: energy baseline set at {} ms", now_millis);
            }
            Some(previous) => {
                let elapsed = now_millis.saturating_sub(previous);
                let increment = self.increment(power_watts, elapsed);
                self.energy_watt_hours = self.energy_watt_hours.saturating_add(increment);
                trace!(
                    "{} W over {} ms -> {} Wh (total {} Wh)",
                    power_watts,
                    elapsed,
                    increment,
                    self.energy_watt_hours
                );
            }
        }
        self.baseline_millis = Some(now_millis);

        Reading {
            timestamp,
            rms_current_amps,
            power_watts,
            energy_watt_hours: self.energy_watt_hours,
        }
    }

    /// Watt-hours contributed by `power_watts` held for `elapsed_millis`
    pub fn increment(&self, power_watts: i32, elapsed_millis: u64) -> i64 {
        let elapsed = i64::try_from(elapsed_millis).unwrap_or(i64::MAX);
        (power_watts as i64).saturating_mul(elapsed) / self.constants.energy_divisor
    }

    pub fn energy_watt_hours(&self) -> i64 {
        self.energy_watt_hours
    }

    /// `true` once a baseline instant exists
    pub fn has_baseline(&self) -> bool {
        self.baseline_millis.is_some()
    }
}
