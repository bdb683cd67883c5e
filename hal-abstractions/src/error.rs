//! Error types shared by board implementations

/// Network, transport and session errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkError {
    /// Link is down (no carrier or no DHCP lease)
    LinkDown,
    /// DNS resolution failed
    DnsError,
    /// Socket bind/connect error
    SocketError,
    /// Request timeout
    Timeout,
    /// Invalid response from server
    InvalidResponse,
    /// Server error (e.g., invalid stratum for NTP)
    ServerError,
    /// All configured servers failed
    AllServersFailed,
    /// TLS handshake failed
    TlsHandshakeFailed,
    /// TLS certificate or key material rejected
    TlsCertificateError,
    /// TLS connection closed unexpectedly
    TlsConnectionClosed,
    /// MQTT connection failed
    MqttConnectionFailed,
    /// MQTT publish failed
    MqttPublishFailed,
    /// MQTT subscribe failed
    MqttSubscribeFailed,
    /// MQTT protocol error
    MqttProtocolError,
    /// MQTT buffer allocation failed
    MqttBufferError,
    /// Operation needs an established session
    NotConnected,
}

impl core::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LinkDown => write!(f, "Link down"),
            Self::DnsError => write!(f, "DNS resolution failed"),
            Self::SocketError => write!(f, "Socket error"),
            Self::Timeout => write!(f, "Request timeout"),
            Self::InvalidResponse => write!(f, "Invalid response"),
            Self::ServerError => write!(f, "Server error"),
            Self::AllServersFailed => write!(f, "All servers failed"),
            Self::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            Self::TlsCertificateError => write!(f, "TLS certificate error"),
            Self::TlsConnectionClosed => write!(f, "TLS connection closed"),
            Self::MqttConnectionFailed => write!(f, "MQTT connection failed"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::MqttSubscribeFailed => write!(f, "MQTT subscribe failed"),
            Self::MqttProtocolError => write!(f, "MQTT protocol error"),
            Self::MqttBufferError => write!(f, "MQTT buffer error"),
            Self::NotConnected => write!(f, "Session not connected"),
        }
    }
}

impl core::error::Error for NetworkError {}

impl embedded_io_async::Error for NetworkError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        match self {
            Self::SocketError | Self::TlsConnectionClosed | Self::NotConnected => {
                embedded_io_async::ErrorKind::BrokenPipe
            }
            Self::Timeout => embedded_io_async::ErrorKind::TimedOut,
            Self::InvalidResponse => embedded_io_async::ErrorKind::InvalidData,
            _ => embedded_io_async::ErrorKind::Other,
        }
    }
}

/// Analog sensor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The converter did not produce a result
    ConversionFailed,
    /// The converter is not powered or calibrated yet
    NotReady,
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConversionFailed => write!(f, "ADC conversion failed"),
            Self::NotReady => write!(f, "ADC not ready"),
        }
    }
}

impl core::error::Error for SensorError {}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io_async::{Error as _, ErrorKind};

    #[test]
    fn test_io_error_kind_mapping() {
        assert_eq!(NetworkError::Timeout.kind(), ErrorKind::TimedOut);
        assert_eq!(NetworkError::SocketError.kind(), ErrorKind::BrokenPipe);
        assert_eq!(NetworkError::NotConnected.kind(), ErrorKind::BrokenPipe);
        assert_eq!(NetworkError::InvalidResponse.kind(), ErrorKind::InvalidData);
        assert_eq!(NetworkError::DnsError.kind(), ErrorKind::Other);
    }
}
