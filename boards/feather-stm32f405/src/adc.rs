//! Current transducer on the analog front end

use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime};
use embassy_stm32::peripherals::ADC1;
use hal_abstractions::{AnalogInput, SensorError};

/// ACS712 output wired to A0 (PA4)
pub struct CurrentProbe {
    adc: Adc<'static, ADC1>,
    channel: AnyAdcChannel<ADC1>,
}

impl CurrentProbe {
    pub fn new(mut adc: Adc<'static, ADC1>, channel: AnyAdcChannel<ADC1>) -> Self {
        adc.set_sample_time(SampleTime::CYCLES144);
        Self { adc, channel }
    }
}

impl AnalogInput for CurrentProbe {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let raw = self.adc.blocking_read(&mut self.channel);
        // 12-bit converter; anything wider is a bus glitch
        if raw > 0x0FFF {
            return Err(SensorError::ConversionFailed);
        }
        Ok(raw)
    }
}
