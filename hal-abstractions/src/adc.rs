//! Analog input port

use crate::error::SensorError;

/// A single analog channel
///
/// `read_raw` performs one blocking conversion and returns the raw count,
/// in the range `0..full_scale_count` of the converter.
pub trait AnalogInput {
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

impl<T: AnalogInput + ?Sized> AnalogInput for &mut T {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        (**self).read_raw()
    }
}
