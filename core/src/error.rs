//! Core error type

use hal_abstractions::{NetworkError, SensorError};

/// Blocking operation governed by a retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    NetworkJoin,
    TimeSync,
    SessionConnect,
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NetworkJoin => write!(f, "network join"),
            Self::TimeSync => write!(f, "time sync"),
            Self::SessionConnect => write!(f, "session connect"),
        }
    }
}

/// Errors surfaced by the measurement core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Network, transport or session failure
    Network(NetworkError),
    /// Analog input failure
    Sensor(SensorError),
    /// Wall-clock time requested before the first successful sync
    TimeNotSynced,
    /// A bounded retry policy ran out of attempts
    RetriesExhausted(Operation),
    /// Outbound record did not fit the payload buffer
    Encode,
    /// Inbound payload is not a valid control message
    Decode,
    /// Configuration rejected at startup
    InvalidConfig(&'static str),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network: {}", e),
            Self::Sensor(e) => write!(f, "sensor: {}", e),
            Self::TimeNotSynced => write!(f, "time not synchronized"),
            Self::RetriesExhausted(op) => write!(f, "retries exhausted during {}", op),
            Self::Encode => write!(f, "record encoding failed"),
            Self::Decode => write!(f, "control message decoding failed"),
            Self::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl core::error::Error for Error {}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::Network(e)
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Error::Sensor(e)
    }
}
