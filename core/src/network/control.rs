//! Inbound control channel
//!
//! Messages arriving on the control channel are handed to a
//! [`ControlHandler`]. The stock handler only logs them; behavior can be
//! attached later by supplying another handler, without touching the
//! measurement pipeline.

use serde::Deserialize;

use crate::error::Error;

/// Control message body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ControlMessage<'a> {
    pub message: &'a str,
}

/// Parse a JSON control payload
pub fn parse_control(payload: &[u8]) -> Result<ControlMessage<'_>, Error> {
    serde_json_core::from_slice::<ControlMessage<'_>>(payload)
        .map(|(message, _)| message)
        .map_err(|_| Error::Decode)
}

/// Consumer of inbound control messages
pub trait ControlHandler {
    fn on_control(&mut self, topic: &str, payload: &[u8]);
}

impl<T: ControlHandler + ?Sized> ControlHandler for &mut T {
    fn on_control(&mut self, topic: &str, payload: &[u8]) {
        (**self).on_control(topic, payload)
    }
}

/// Logs every control message and takes no action
#[derive(Debug, Default)]
pub struct LoggingControlHandler {
    received: u32,
    malformed: u32,
}

impl LoggingControlHandler {
    pub const fn new() -> Self {
        Self {
            received: 0,
            malformed: 0,
        }
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn malformed(&self) -> u32 {
        self.malformed
    }
}

impl ControlHandler for LoggingControlHandler {
    fn on_control(&mut self, topic: &str, payload: &[u8]) {
        self.received = self.received.saturating_add(1);
        info!("incoming: {}", topic);
        match parse_control(payload) {
            Ok(control) => info!("{}", control.message),
            Err(_) => {
                self.malformed = self.malformed.saturating_add(1);
                warn!("Malformed control message ({} bytes)", payload.len());
            }
        }
    }
}
