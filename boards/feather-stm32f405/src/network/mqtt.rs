//! MQTT v5.0 session over TLS 1.3
//!
//! Implements [`PubSubSession`] with `rust-mqtt` on top of `embedded-tls` and
//! an embassy-net TCP socket. The connection lives in static buffers (see
//! `session_buffers`) so it survives between cycles; a lost connection is
//! dropped and rebuilt from scratch by the next `connect`.

#![allow(unsafe_code)] // session buffer hand-out, unchecked topic names

use defmt::{debug, error, info, warn, Debug2Format};
use embassy_net::dns::DnsQueryType;
use embassy_net::{IpEndpoint, Stack};
use embedded_tls::cert_verify::CertVerifier;
use embedded_tls::{
    Aes128GcmSha256, Certificate, CryptoProvider, TlsClock, TlsConfig, TlsConnection, TlsContext,
    TlsVerifier,
};
use hal_abstractions::{Credentials, Endpoint, InboundMessage, NetworkError, PubSubSession};
use heapless::{String, Vec};
use rust_mqtt::{
    buffer::BumpBuffer,
    client::{
        event::Event,
        options::{ConnectOptions, PublicationOptions, SubscriptionOptions, TopicReference},
        Client,
    },
    config::{KeepAlive, SessionExpiryInterval},
    types::{MqttString, QoS, TopicFilter, TopicName},
    Bytes,
};

use crate::config::MqttConfig;
use crate::session_buffers;

use super::socket::{AsyncTcpSocket, SharedSocket};

const MAX_TOPIC_LEN: usize = 64;
const MAX_INBOUND_PAYLOAD: usize = 256;

type TlsStream = TlsConnection<'static, AsyncTcpSocket<'static>, Aes128GcmSha256>;
type MqttClient = Client<'static, TlsStream, BumpBuffer<'static>, 1, 1, 1, 0>;

/// Largest broker certificate the verifier will hold
const MAX_SERVER_CERT: usize = 2048;

/// Wall-clock source for certificate validity checks
///
/// The wall clock is owned by the device's time base, which the TLS layer
/// cannot reach, so validity periods are not checked. Chain and hostname are.
struct NoValidityClock;

impl TlsClock for NoValidityClock {
    fn now() -> Option<u64> {
        None
    }
}

type BrokerVerifier = CertVerifier<Aes128GcmSha256, NoValidityClock, MAX_SERVER_CERT>;

/// RNG + certificate verifier handed to the TLS handshake
///
/// The verifier checks the broker's chain against the CA set on the
/// `TlsConfig` and its name against the configured server name.
struct SessionCryptoProvider<'a, RNG> {
    rng: &'a mut RNG,
    verifier: BrokerVerifier,
}

impl<'a, RNG> SessionCryptoProvider<'a, RNG> {
    fn new(rng: &'a mut RNG) -> Self {
        Self {
            rng,
            verifier: CertVerifier::new(),
        }
    }
}

impl<RNG> CryptoProvider for SessionCryptoProvider<'_, RNG>
where
    RNG: rand_core::CryptoRngCore,
{
    type CipherSuite = Aes128GcmSha256;
    type Signature = &'static [u8];

    fn rng(&mut self) -> impl rand_core::CryptoRngCore {
        &mut *self.rng
    }

    fn verifier(
        &mut self,
    ) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, embedded_tls::TlsError> {
        Ok(&mut self.verifier)
    }
}

/// Last message received on a subscribed channel
#[derive(Default)]
struct Inbound {
    topic: String<MAX_TOPIC_LEN>,
    payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
}

impl Inbound {
    fn store(&mut self, topic: &str, payload: &[u8]) -> bool {
        self.topic.clear();
        self.payload.clear();
        self.topic.push_str(topic).is_ok() && self.payload.extend_from_slice(payload).is_ok()
    }

    fn message(&self) -> InboundMessage<'_> {
        InboundMessage {
            topic: self.topic.as_str(),
            payload: &self.payload,
        }
    }
}

/// Topic names must not carry wildcards or NUL
fn validate_topic(topic: &str) -> Result<(), NetworkError> {
    if topic.is_empty() || topic.len() > MAX_TOPIC_LEN || topic.contains(['+', '#', '\0']) {
        error!("Invalid MQTT topic name: {}", topic);
        return Err(NetworkError::MqttProtocolError);
    }
    Ok(())
}

/// Secured MQTT session
pub struct MqttSession<RNG: 'static> {
    stack: Stack<'static>,
    rng: RNG,
    config: MqttConfig,
    credentials: Option<Credentials<'static>>,
    client: Option<MqttClient>,
    socket: Option<SharedSocket>,
    inbound: Inbound,
}

impl<RNG> MqttSession<RNG>
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    pub fn new(stack: Stack<'static>, rng: RNG, config: MqttConfig) -> Self {
        Self {
            stack,
            rng,
            config,
            credentials: None,
            client: None,
            socket: None,
            inbound: Inbound::default(),
        }
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<IpEndpoint, NetworkError> {
        let ip = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                error!("DNS query for {} failed: {:?}", host, Debug2Format(&e));
                NetworkError::DnsError
            })?
            .first()
            .copied()
            .ok_or(NetworkError::DnsError)?;
        Ok(IpEndpoint::new(ip, port))
    }

    async fn open(
        &mut self,
        endpoint: Endpoint<'_>,
        client_id: &str,
    ) -> Result<MqttClient, NetworkError> {
        let Some(credentials) = self.credentials else {
            error!("No trust anchor installed, refusing to connect");
            return Err(NetworkError::TlsHandshakeFailed);
        };
        if credentials.trust_anchor.is_empty() {
            error!("Trust anchor is empty, refusing to connect");
            return Err(NetworkError::TlsHandshakeFailed);
        }

        let remote = self.resolve(endpoint.host, endpoint.port).await?;

        // SAFETY: `self.client` and `self.socket` were cleared by the caller;
        // no earlier socket, TLS stream or MQTT client still borrows the buffers.
        let buffers = unsafe { session_buffers::take(self.stack) };
        self.socket = Some(buffers.socket);

        let mut socket = AsyncTcpSocket::new(buffers.socket);
        socket.connect(remote).await?;
        debug!("TCP connected to {}", Debug2Format(&remote));

        let tls_config = TlsConfig::new()
            .with_server_name(endpoint.host)
            .with_ca(Certificate::X509(credentials.trust_anchor))
            .with_cert(Certificate::X509(credentials.client_cert))
            .with_priv_key(credentials.client_key);

        let mut tls: TlsStream = TlsConnection::new(socket, buffers.tls_read, buffers.tls_write);
        tls.open(TlsContext::new(
            &tls_config,
            SessionCryptoProvider::new(&mut self.rng),
        ))
        .await
        .map_err(|e| {
            error!("TLS handshake failed: {:?}", Debug2Format(&e));
            match e {
                embedded_tls::TlsError::InvalidCertificate => NetworkError::TlsCertificateError,
                _ => NetworkError::TlsHandshakeFailed,
            }
        })?;
        debug!("TLS 1.3 handshake complete, broker {} verified", endpoint.host);

        let connect_opts = ConnectOptions {
            session_expiry_interval: SessionExpiryInterval::EndOnDisconnect,
            clean_start: true,
            keep_alive: match self.config.keep_alive_secs {
                0 => KeepAlive::Infinite,
                secs => KeepAlive::Seconds(secs),
            },
            will: None,
            user_name: None,
            password: None,
        };
        let mqtt_client_id =
            MqttString::new(client_id.into()).map_err(|_| NetworkError::MqttProtocolError)?;

        let mut client: MqttClient = Client::new(buffers.mqtt);
        client
            .connect(tls, &connect_opts, Some(mqtt_client_id))
            .await
            .map_err(|e| {
                error!("MQTT connect failed: {:?}", Debug2Format(&e));
                NetworkError::MqttConnectionFailed
            })?;
        Ok(client)
    }

    fn drop_connection(&mut self) {
        if self.client.take().is_some() {
            warn!("MQTT session dropped");
        }
        self.socket = None;
    }

    /// Bytes are waiting on the TCP socket and no read is in flight
    fn inbound_ready(&self) -> bool {
        self.socket
            .and_then(|socket| socket.try_borrow().ok().map(|s| s.can_recv()))
            .unwrap_or(false)
    }
}

impl<RNG> PubSubSession for MqttSession<RNG>
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    fn install_credentials(&mut self, credentials: Credentials<'static>) {
        debug!(
            "Credentials: CA {} bytes, cert {} bytes, key {} bytes",
            credentials.trust_anchor.len(),
            credentials.client_cert.len(),
            credentials.client_key.len()
        );
        self.credentials = Some(credentials);
    }

    async fn connect(&mut self, endpoint: Endpoint<'_>, client_id: &str) -> Result<(), NetworkError> {
        self.drop_connection();
        let client = self.open(endpoint, client_id).await?;
        self.client = Some(client);
        info!("MQTT session up as {}", client_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), NetworkError> {
        let client = self.client.as_mut().ok_or(NetworkError::NotConnected)?;
        let filter = MqttString::new(topic.into())
            .ok()
            .and_then(|s| TopicFilter::new(s).ok())
            .ok_or(NetworkError::MqttProtocolError)?;
        client
            .subscribe(filter, SubscriptionOptions::default())
            .await
            .map_err(|e| {
                error!("MQTT subscribe to {} failed: {:?}", topic, Debug2Format(&e));
                NetworkError::MqttSubscribeFailed
            })?;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), NetworkError> {
        validate_topic(topic)?;
        let client = self.client.as_mut().ok_or(NetworkError::NotConnected)?;

        let name = MqttString::new(topic.into()).map_err(|_| NetworkError::MqttProtocolError)?;
        // SAFETY: validate_topic rejected wildcards, NUL and oversized names
        let topic_name = unsafe { TopicName::new_unchecked(name) };
        let options = PublicationOptions {
            retain: false,
            message_expiry_interval: None,
            topic: TopicReference::Name(topic_name),
            qos: QoS::AtMostOnce,
        };

        let result = client.publish(&options, Bytes::from(payload)).await;
        if let Err(e) = result {
            error!("MQTT publish to {} failed: {:?}", topic, Debug2Format(&e));
            self.drop_connection();
            return Err(NetworkError::MqttPublishFailed);
        }
        Ok(())
    }

    /// Handle at most one inbound packet
    ///
    /// A packet read is never abandoned half way: `client.poll()` only runs
    /// once the socket has bytes queued, and then runs to completion. Records
    /// already decrypted but not yet consumed wait for the next TCP segment.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a session; `MqttConnectionFailed` when the
    /// stream fails, after which the connection is dropped.
    async fn poll(&mut self) -> Result<Option<InboundMessage<'_>>, NetworkError> {
        if self.client.is_none() {
            return Err(NetworkError::NotConnected);
        }
        if !self.inbound_ready() {
            return Ok(None);
        }
        let client = self.client.as_mut().ok_or(NetworkError::NotConnected)?;

        let outcome = match client.poll().await {
            Ok(Event::Publish(publish)) => {
                let stored = self
                    .inbound
                    .store(publish.topic.as_str(), publish.message.as_ref());
                if !stored {
                    warn!("Inbound message on {} too large, dropped", publish.topic.as_str());
                }
                Ok(stored)
            }
            Ok(_) => Ok(false),
            Err(e) => {
                error!("MQTT poll failed: {:?}", Debug2Format(&e));
                Err(NetworkError::MqttConnectionFailed)
            }
        };

        match outcome {
            Ok(true) => Ok(Some(self.inbound.message())),
            Ok(false) => Ok(None),
            Err(e) => {
                self.drop_connection();
                Err(e)
            }
        }
    }
}
