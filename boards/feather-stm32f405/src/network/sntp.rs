//! SNTP time source
//!
//! One request walks the configured servers in order and returns the first
//! valid answer. Retry pacing and plausibility checks belong to the core's
//! time base.

use defmt::{info, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Instant, Timer};
use hal_abstractions::{NetworkError, TimeSource};

use crate::config::SntpConfig;

const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

pub struct SntpTimeSource {
    stack: Stack<'static>,
    config: SntpConfig,
}

impl SntpTimeSource {
    pub fn new(stack: Stack<'static>, config: SntpConfig) -> Self {
        Self { stack, config }
    }

    async fn sntp_request(&self, server: &str) -> Result<u64, NetworkError> {
        let server_ip = self
            .stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(|_| NetworkError::DnsError)?
            .first()
            .copied()
            .ok_or(NetworkError::DnsError)?;
        let server_endpoint = IpEndpoint::new(server_ip, NTP_PORT);

        let mut rx_meta = [PacketMetadata::EMPTY; 2];
        let mut rx_buffer = [0u8; 64];
        let mut tx_meta = [PacketMetadata::EMPTY; 2];
        let mut tx_buffer = [0u8; 64];
        let mut socket = UdpSocket::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|_| NetworkError::SocketError)?;

        // LI=0, VN=3, Mode=3 (client)
        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = 0x1B;
        let sent_at = Instant::now();
        socket
            .send_to(&request, server_endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let timeout = Timer::after(Duration::from_millis(self.config.timeout_ms));
        let (len, from) = match select(timeout, socket.recv_from(&mut response)).await {
            Either::First(_) => return Err(NetworkError::Timeout),
            Either::Second(result) => result.map_err(|_| NetworkError::SocketError)?,
        };
        let rtt = Instant::now().duration_since(sent_at);

        if len < NTP_PACKET_LEN || from.endpoint.addr != server_ip {
            return Err(NetworkError::InvalidResponse);
        }

        let stratum = response[1];
        if stratum == 0 || stratum > self.config.max_stratum {
            warn!("{}: stratum {} rejected (max {})", server, stratum, self.config.max_stratum);
            return Err(NetworkError::ServerError);
        }

        let tx_secs =
            u32::from_be_bytes([response[40], response[41], response[42], response[43]]) as u64;
        let tx_frac =
            u32::from_be_bytes([response[44], response[45], response[46], response[47]]) as u64;

        // Transmit timestamp + half the round trip, rounded to whole seconds
        let micros = (tx_frac * 1_000_000 >> 32) + rtt.as_micros() / 2;
        let unix_secs = tx_secs
            .checked_sub(NTP_UNIX_OFFSET)
            .ok_or(NetworkError::InvalidResponse)?
            + (micros + 500_000) / 1_000_000;

        info!(
            "{} ({}) answered {} (stratum {}, RTT {} us)",
            server,
            Debug2Format(&server_endpoint),
            unix_secs,
            stratum,
            rtt.as_micros()
        );
        Ok(unix_secs)
    }
}

impl TimeSource for SntpTimeSource {
    async fn request_time(&mut self) -> Result<u64, NetworkError> {
        for server in self.config.servers {
            match self.sntp_request(server).await {
                Ok(secs) => return Ok(secs),
                Err(e) => warn!("SNTP request to {} failed: {:?}", server, e),
            }
        }
        Err(NetworkError::AllServersFailed)
    }
}
