//! Records distributed through the event hub.

use crate::LimitState;

/// Emitted whenever an item's effective limits state changes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitsEvent {
    pub target: String,
    pub packet: String,
    pub item: String,
    /// `None` when the item had never been classified before.
    pub old_state: Option<LimitState>,
    pub new_state: LimitState,
    /// Converted value that produced the transition.
    pub value: f64,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Raw copy of a received or sent packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketSnapshot {
    pub buffer: Vec<u8>,
    pub target: String,
    pub packet: String,
    /// Unix timestamp in milliseconds.
    pub received_time_ms: u64,
    pub flags: u32,
    pub received_count: u64,
}

impl PacketSnapshot {
    /// Flag set on snapshots of data replayed from storage rather than
    /// received live.
    pub const FLAG_STORED: u32 = 0x1;

    pub fn is_stored(&self) -> bool {
        self.flags & Self::FLAG_STORED != 0
    }
}

/// Free-text operational message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerMessage {
    pub timestamp_ms: u64,
    pub message: String,
}

impl ServerMessage {
    /// Create a message stamped with the current time.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: crate::current_timestamp_ms(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_flag() {
        let mut snapshot = PacketSnapshot {
            buffer: vec![0xAB],
            target: "INST".into(),
            packet: "HEALTH_STATUS".into(),
            received_time_ms: 0,
            flags: 0,
            received_count: 1,
        };
        assert!(!snapshot.is_stored());
        snapshot.flags |= PacketSnapshot::FLAG_STORED;
        assert!(snapshot.is_stored());
    }

    #[test]
    fn server_message_is_timestamped() {
        let before = crate::current_timestamp_ms();
        let msg = ServerMessage::new("hello");
        assert!(msg.timestamp_ms >= before);
        assert_eq!(msg.message, "hello");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn limits_event_serializes_states_by_name() {
        let event = LimitsEvent {
            target: "INST".into(),
            packet: "HEALTH_STATUS".into(),
            item: "TEMP1".into(),
            old_state: None,
            new_state: LimitState::RedLow,
            value: -100.0,
            timestamp_ms: 1703160000000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["new_state"], "RED_LOW");
        assert!(json["old_state"].is_null());
    }
}
