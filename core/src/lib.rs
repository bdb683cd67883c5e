//! Platform-agnostic core logic for the energy telemetry node
//!
//! Samples a current transducer, integrates power into watt-hours and
//! publishes timestamped readings over a secured publish/subscribe session.
//! It has NO hardware dependencies: boards provide the capabilities defined in
//! `hal-abstractions`.
//!
//! - **`sensor`**: fixed-window peak-to-peak sampler
//! - **`energy`**: RMS current, power and watt-hour integration
//! - **`time`**: network-synchronized wall clock
//! - **`network`**: connection state machine, publisher, control channel
//! - **`device`**: the measurement cycle tying it all together
//! - **`config`** / **`retry`** / **`error`**: ambient types

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

#[macro_use]
mod fmt;

pub mod config;
pub mod device;
pub mod energy;
pub mod error;
pub mod network;
pub mod retry;
pub mod sensor;
pub mod time;

pub use config::DeviceConfig;
pub use device::{CycleOutcome, Device, DeviceParts};
pub use energy::{EnergyIntegrator, Reading};
pub use error::{Error, Operation};
pub use network::{ConnectionStage, ConnectivityManager, ControlHandler, LoggingControlHandler, Publisher};
pub use retry::RetryPolicy;
pub use sensor::SignalSampler;
pub use time::TimeBase;
