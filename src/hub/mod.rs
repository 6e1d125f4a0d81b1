//! Event distribution hub.
//!
//! Three independent channels (limits events, packet snapshots, server
//! messages), each with its own subscriber set. Every subscriber owns a
//! bounded FIFO; publishing never blocks and a full queue drops its oldest
//! record.
//!
//! ```rust
//! use std::time::Duration;
//! use ctsd::config::HubConfig;
//! use ctsd::hub::Hub;
//! use ctsd_types::ServerMessage;
//!
//! # tokio_test::block_on(async {
//! let hub = Hub::new(&HubConfig::default());
//! let id = hub.subscribe_server_messages(None).unwrap();
//! hub.publish_server_message(ServerMessage::new("INST_INT connected"));
//!
//! let message = hub.get_server_message(id, Duration::from_millis(10)).await.unwrap();
//! assert_eq!(message.unwrap().message, "INST_INT connected");
//! # });
//! ```

mod channel;
mod queue;

pub use channel::{Channel, Filter, Record, SubscriberId};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ctsd_types::{LimitsEvent, PacketSnapshot, ServerMessage};

use crate::config::HubConfig;
use crate::error::Result;

pub struct Hub {
    next_id: AtomicU64,
    limits: Channel<LimitsEvent>,
    packets: Channel<PacketSnapshot>,
    messages: Channel<ServerMessage>,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            limits: Channel::new("limits", config.limits_queue_depth),
            packets: Channel::new("packets", config.packet_queue_depth),
            messages: Channel::new("messages", config.message_queue_depth),
        }
    }

    fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn limits_events(&self) -> &Channel<LimitsEvent> {
        &self.limits
    }

    pub fn packets(&self) -> &Channel<PacketSnapshot> {
        &self.packets
    }

    pub fn server_messages(&self) -> &Channel<ServerMessage> {
        &self.messages
    }

    /// Subscribe to limits events. `depth` overrides the configured queue depth.
    pub fn subscribe_limits_events(&self, depth: Option<usize>) -> Result<SubscriberId> {
        self.limits.subscribe(self.next_id(), Filter::all(), depth)
    }

    /// Subscribe to packet snapshots, optionally restricted by `filter`.
    pub fn subscribe_packets(&self, filter: Filter, depth: Option<usize>) -> Result<SubscriberId> {
        self.packets.subscribe(self.next_id(), filter, depth)
    }

    pub fn subscribe_server_messages(&self, depth: Option<usize>) -> Result<SubscriberId> {
        self.messages.subscribe(self.next_id(), Filter::all(), depth)
    }

    pub fn unsubscribe_limits_events(&self, id: SubscriberId) -> Result<()> {
        self.limits.unsubscribe(id)
    }

    pub fn unsubscribe_packets(&self, id: SubscriberId) -> Result<()> {
        self.packets.unsubscribe(id)
    }

    pub fn unsubscribe_server_messages(&self, id: SubscriberId) -> Result<()> {
        self.messages.unsubscribe(id)
    }

    pub async fn get_limits_event(&self, id: SubscriberId, timeout: Duration) -> Result<Option<LimitsEvent>> {
        self.limits.get(id, timeout).await
    }

    pub async fn get_packet_snapshot(&self, id: SubscriberId, timeout: Duration) -> Result<Option<PacketSnapshot>> {
        self.packets.get(id, timeout).await
    }

    pub async fn get_server_message(&self, id: SubscriberId, timeout: Duration) -> Result<Option<ServerMessage>> {
        self.messages.get(id, timeout).await
    }

    pub fn publish_limits_event(&self, event: LimitsEvent) -> usize {
        self.limits.publish(event)
    }

    pub fn publish_packet(&self, snapshot: PacketSnapshot) -> usize {
        self.packets.publish(snapshot)
    }

    pub fn publish_server_message(&self, message: ServerMessage) -> usize {
        self.messages.publish(message)
    }

    /// Dispose every subscriber of every channel.
    pub fn clear(&self) {
        self.limits.clear();
        self.packets.clear();
        self.messages.clear();
    }
}
