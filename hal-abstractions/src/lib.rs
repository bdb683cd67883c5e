//! Hardware abstraction traits for the energy telemetry node
//!
//! This crate defines the capabilities the measurement core needs from a
//! board. BSPs implement these traits; the core never touches a peripheral
//! directly.
//!
//! - **`adc`**: one analog input channel, read in blocking conversions
//! - **`clock`**: free-running monotonic millisecond clock
//! - **`network`**: link join, network time source and the secured
//!   publish/subscribe session
//! - **`error`**: error enums shared by all implementations

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod adc;
pub mod clock;
pub mod error;
pub mod network;

pub use adc::AnalogInput;
pub use clock::MonotonicClock;
pub use error::{NetworkError, SensorError};
pub use network::{Credentials, Endpoint, InboundMessage, NetworkLink, PubSubSession, TimeSource};
