//! Network adapters
//!
//! Board implementations of the capability traits driven by the core's
//! connectivity manager.

mod link;
mod mqtt;
mod sntp;
mod socket;

pub use link::EthLink;
pub use mqtt::MqttSession;
pub use sntp::SntpTimeSource;
pub use socket::SharedSocket;
