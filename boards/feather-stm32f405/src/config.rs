//! Board configuration
//!
//! Starts from the core defaults and adjusts what differs on this hardware:
//! a 12-bit ADC and a unique client id per chip.

use hal_abstractions::Endpoint;
use meter_core::config::{ConnectivityConfig, SensorCalibration};
use meter_core::DeviceConfig;

/// SNTP client configuration
#[derive(Debug, Clone, Copy)]
pub struct SntpConfig {
    /// Servers tried in order, once each per request
    pub servers: &'static [&'static str],
    /// Per-server response timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum accepted stratum level (1-15)
    pub max_stratum: u8,
}

impl Default for SntpConfig {
    fn default() -> Self {
        Self {
            servers: &["pool.ntp.org", "time.nist.gov"],
            timeout_ms: 5000,
            max_stratum: 3,
        }
    }
}

/// Network stack configuration
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    /// MAC address for Ethernet
    pub mac_addr: [u8; 6],
    /// Random seed for network stack
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac_addr: [0x02, 0x00, 0x00, 0x12, 0x34, 0x56],
            seed: 0x1234_5678_u64,
        }
    }
}

/// Session transport settings
#[derive(Debug, Clone, Copy)]
pub struct MqttConfig {
    /// Keep-alive interval in seconds (0 disables)
    pub keep_alive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 60,
        }
    }
}

/// Feather STM32F405: 12-bit ADC on a 3.3 V reference
pub fn device_config(client_id: &'static str) -> DeviceConfig {
    DeviceConfig {
        calibration: SensorCalibration {
            full_scale_count: 4096,
            ..SensorCalibration::default()
        },
        connectivity: ConnectivityConfig {
            endpoint: Endpoint {
                host: "iot.example.com",
                port: 8883,
            },
            client_id,
            ..ConnectivityConfig::default()
        },
        ..DeviceConfig::default()
    }
}
