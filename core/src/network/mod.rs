//! Connectivity and publication
//!
//! - **`state`**: connection stages and the health record
//! - **`manager`**: the connection sequence and per-cycle health checks
//! - **`publisher`**: outbound readings
//! - **`control`**: inbound control messages

pub mod control;
pub mod manager;
pub mod publisher;
pub mod state;

pub use control::{parse_control, ControlHandler, ControlMessage, LoggingControlHandler};
pub use manager::ConnectivityManager;
pub use publisher::{encode, OutboundRecord, Publisher, PAYLOAD_CAPACITY};
pub use state::{ConnectionStage, ConnectionState, LossReason};
