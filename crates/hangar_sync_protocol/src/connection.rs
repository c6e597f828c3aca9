//! Network observations.

use serde::{Deserialize, Serialize};

/// Physical link type, as far as the platform reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Wireless LAN.
    Wifi,
    /// Mobile data.
    Cellular,
    /// Wired network.
    Ethernet,
    /// Not reported.
    #[default]
    Unknown,
}

/// Qualitative bandwidth class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    /// Very slow link.
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// 2G-class link.
    #[serde(rename = "2g")]
    Cellular2g,
    /// 3G-class link.
    #[serde(rename = "3g")]
    Cellular3g,
    /// 4G-class or better.
    #[serde(rename = "4g")]
    Cellular4g,
    /// Not reported.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

/// Best-effort quality metrics from the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQuality {
    /// Link type.
    pub connection_type: ConnectionType,
    /// Bandwidth class.
    pub effective_type: EffectiveType,
    /// Estimated round-trip time in milliseconds.
    pub rtt_ms: Option<u32>,
}

/// A point-in-time network observation. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Whether the client is online.
    pub is_online: bool,
    /// Link type.
    pub connection_type: ConnectionType,
    /// Bandwidth class.
    pub effective_type: EffectiveType,
    /// Estimated round-trip time in milliseconds.
    pub rtt_ms: Option<u32>,
}

impl ConnectionStatus {
    /// Builds a status; missing quality data degrades to "unknown".
    pub fn new(is_online: bool, quality: Option<NetworkQuality>) -> Self {
        let quality = quality.unwrap_or_default();
        Self {
            is_online,
            connection_type: quality.connection_type,
            effective_type: quality.effective_type,
            rtt_ms: quality.rtt_ms,
        }
    }

    /// An offline observation with unknown quality.
    pub fn offline() -> Self {
        Self::new(false, None)
    }
}
