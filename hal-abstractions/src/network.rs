//! Network capability traits
//!
//! The core drives three collaborators, each behind its own trait so boards
//! can swap implementations without touching the connection sequence:
//!
//! - [`NetworkLink`]: layer-2/3 link (Ethernet + DHCP, Wi-Fi association, ...)
//! - [`TimeSource`]: one network time request (SNTP)
//! - [`PubSubSession`]: secured, authenticated publish/subscribe session
//!
//! All async methods perform a single attempt. Retry scheduling belongs to the
//! caller.

use core::future::Future;

use crate::error::NetworkError;

/// Broker endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint<'a> {
    /// Hostname, used for DNS and SNI
    pub host: &'a str,
    /// Port (8883 for MQTT over TLS)
    pub port: u16,
}

/// Transport security material
///
/// DER encoded. Provisioning is outside the firmware; boards embed or load
/// the blobs and hand them over as `'static` slices.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    /// Certificate authority used to authenticate the broker
    pub trust_anchor: &'a [u8],
    /// Client certificate presented to the broker
    pub client_cert: &'a [u8],
    /// Private key matching `client_cert`
    pub client_key: &'a [u8],
}

/// Message received on a subscribed channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

/// Network link (physical + addressing)
pub trait NetworkLink {
    /// Start joining the network
    ///
    /// Returns once the join has been requested; completion is observed with
    /// [`NetworkLink::is_joined`].
    fn begin_join(&mut self) -> impl Future<Output = Result<(), NetworkError>>;

    /// `true` once the link is up and addressed
    fn is_joined(&self) -> bool;
}

/// Network time source
pub trait TimeSource {
    /// Request the current UTC time, in seconds since the Unix epoch
    fn request_time(&mut self) -> impl Future<Output = Result<u64, NetworkError>>;
}

/// Secured publish/subscribe session
pub trait PubSubSession {
    /// Install the trust anchor and client identity used by the next `connect`
    fn install_credentials(&mut self, credentials: Credentials<'static>);

    /// Establish the transport and authenticate the session (one attempt)
    fn connect(
        &mut self,
        endpoint: Endpoint<'_>,
        client_id: &str,
    ) -> impl Future<Output = Result<(), NetworkError>>;

    /// `true` while the session is believed alive
    fn is_connected(&self) -> bool;

    /// Subscribe to a channel
    fn subscribe(&mut self, topic: &str) -> impl Future<Output = Result<(), NetworkError>>;

    /// Publish a payload on a channel
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), NetworkError>>;

    /// Service the session: keep-alive and inbound traffic
    ///
    /// Must not block waiting for traffic. Returns `Ok(Some(_))` when an
    /// inbound message arrived, `Ok(None)` when the session is alive and idle
    /// and an error once the session is lost.
    fn poll(
        &mut self,
    ) -> impl Future<Output = Result<Option<InboundMessage<'_>>, NetworkError>>;
}
