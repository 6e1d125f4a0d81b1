//! Connection state and traffic counters for interfaces and routers.

use core::fmt;

/// Connection state of an interface or router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Attempting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Attempting => "ATTEMPTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The seven traffic counters kept per interface or router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkCounters {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub write_count: u64,
    pub read_count: u64,
    pub write_error_count: u64,
    pub read_error_count: u64,
    /// Errors reported by the protocol layer above the transport.
    pub protocol_error_count: u64,
}

impl LinkCounters {
    /// Counters in their canonical reporting order.
    pub fn as_array(&self) -> [u64; 7] {
        [
            self.bytes_written,
            self.bytes_read,
            self.write_count,
            self.read_count,
            self.write_error_count,
            self.read_error_count,
            self.protocol_error_count,
        ]
    }
}

/// Point-in-time view of an interface or router.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkInfo {
    pub name: String,
    pub state: ConnectionState,
    pub counters: LinkCounters,
}

/// Cumulative command and telemetry counts for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetInfo {
    pub target: String,
    /// Name of the mapped interface, `None` for unmapped targets.
    pub interface: Option<String>,
    pub cmd_count: u64,
    pub tlm_count: u64,
}

/// Received count of a single packet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketCount {
    pub target: String,
    pub packet: String,
    pub count: u64,
}
