//! Signal sampler
//!
//! Polls the current transducer for one window and reports the peak-to-peak
//! voltage seen on the ADC. The window blocks the caller; it is the dominant
//! part of every cycle.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{AnalogInput, MonotonicClock};

use crate::config::SensorCalibration;

/// Running minimum and maximum of raw ADC counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Extrema {
    pub min: u16,
    pub max: u16,
}

impl Extrema {
    /// Empty window: minimum starts at full scale, maximum at zero
    pub const fn new(full_scale_count: u16) -> Self {
        Self {
            min: full_scale_count,
            max: 0,
        }
    }

    pub fn record(&mut self, raw: u16) {
        if raw > self.max {
            self.max = raw;
        }
        if raw < self.min {
            self.min = raw;
        }
    }

    /// Span in counts; zero while nothing has been recorded
    pub fn span(&self) -> u16 {
        self.max.saturating_sub(self.min)
    }
}

/// Peak-to-peak voltage for a window's extrema
pub fn peak_to_peak_volts(extrema: Extrema, adc_resolution: f32) -> f32 {
    extrema.span() as f32 * adc_resolution
}

/// Fixed-window peak-to-peak sampler
pub struct SignalSampler {
    window_ms: u64,
    poll_interval_ms: u32,
    full_scale_count: u16,
    adc_resolution: f32,
}

impl SignalSampler {
    pub fn new(calibration: &SensorCalibration) -> Self {
        Self {
            window_ms: calibration.window_ms,
            poll_interval_ms: calibration.poll_interval_ms,
            full_scale_count: calibration.full_scale_count,
            adc_resolution: calibration.adc_resolution(),
        }
    }

    /// Sample for one window and return the peak-to-peak voltage
    ///
    /// Failed conversions are skipped. A dead or disconnected probe yields 0,
    /// which callers read as "no load".
    pub async fn sample<A, C, D>(&self, adc: &mut A, clock: &C, delay: &mut D) -> f32
    where
        A: AnalogInput,
        C: MonotonicClock,
        D: DelayNs,
    {
        let mut extrema = Extrema::new(self.full_scale_count);
        let mut samples: u32 = 0;
        let mut failures: u32 = 0;

        let start = clock.now_millis();
        while clock.now_millis().saturating_sub(start) < self.window_ms {
            match adc.read_raw() {
                Ok(raw) => {
                    extrema.record(raw);
                    samples += 1;
                }
                Err(_) => failures += 1,
            }
            delay.delay_ms(self.poll_interval_ms).await;
        }

        let volts = peak_to_peak_volts(extrema, self.adc_resolution);
        debug!(
            "Window done: {} samples, {} failed, min={} max={} -> {} Vpp",
            samples,
            failures,
            extrema.min,
            extrema.max,
            volts
        );
        volts
    }
}
