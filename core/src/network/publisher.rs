//! Reading publisher
//!
//! Serializes a [`Reading`] as a four-field JSON record and emits it on the
//! readings channel. Telemetry is best effort: a failed send is reported to
//! the caller and the reading is dropped.

use hal_abstractions::PubSubSession;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::PublisherConfig;
use crate::energy::Reading;
use crate::error::Error;

/// Capacity of the serialized record
pub const PAYLOAD_CAPACITY: usize = 256;

/// Wire form of a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    /// Epoch seconds
    pub time: u64,
    /// Amperes
    pub rms_current: f32,
    /// Watts
    pub power: i32,
    /// Cumulative watt-hours
    pub watt_hours: i64,
}

impl From<&Reading> for OutboundRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            time: reading.timestamp,
            rms_current: reading.rms_current_amps,
            power: reading.power_watts,
            watt_hours: reading.energy_watt_hours,
        }
    }
}

/// Encode a reading into its JSON payload
pub fn encode(reading: &Reading) -> Result<Vec<u8, PAYLOAD_CAPACITY>, Error> {
    serde_json_core::to_vec(&OutboundRecord::from(reading)).map_err(|_| Error::Encode)
}

/// Publisher bound to the readings channel
pub struct Publisher {
    topic: &'static str,
}

impl Publisher {
    pub fn new(config: &PublisherConfig) -> Self {
        Self {
            topic: config.readings_topic,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    /// Publish one reading; no retry
    ///
    /// # Errors
    ///
    /// `Encode` if the record does not fit the payload buffer, or
    /// `Network` with the session's failure.
    pub async fn publish<S: PubSubSession>(
        &self,
        session: &mut S,
        reading: &Reading,
    ) -> Result<(), Error> {
        let payload = encode(reading)?;
        session.publish(self.topic, &payload).await?;
        trace!("Published {} bytes to {}", payload.len(), self.topic);
        Ok(())
    }
}
