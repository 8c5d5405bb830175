use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{ViewerError, ViewerResult};

use super::ComputedChannelMeta;

/// Cross-window message, serialized as `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BusMessage {
    ComputedChannelsUpdated {
        #[serde(rename = "computedChannels")]
        computed_channels: Vec<ComputedChannelMeta>,
    },
    ComputedChannelDeleted {
        id: String,
    },
}

impl BusMessage {
    pub fn to_json(&self) -> ViewerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> ViewerResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Receiver end living in another window.
pub trait BusPeer {
    fn name(&self) -> &str;
    fn deliver(&mut self, message: &str) -> ViewerResult<()>;
}

/// Fan-out of serialized messages to every registered peer.
#[derive(Default)]
pub struct MessageBus {
    peers: Vec<Box<dyn BusPeer>>,
    sent: u64,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("peers", &self.peers.iter().map(|peer| peer.name()).collect::<Vec<_>>())
            .field("sent", &self.sent)
            .finish()
    }
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, peer: Box<dyn BusPeer>) -> ViewerResult<()> {
        if self.peers.iter().any(|existing| existing.name() == peer.name()) {
            return Err(ViewerError::InvalidData(format!(
                "bus peer '{}' already connected",
                peer.name()
            )));
        }
        self.peers.push(peer);
        Ok(())
    }

    pub fn disconnect(&mut self, name: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|peer| peer.name() != name);
        before != self.peers.len()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Delivers to every peer; a failing peer is logged and skipped.
    ///
    /// Returns the number of peers that accepted the message.
    pub fn broadcast(&mut self, message: &BusMessage) -> ViewerResult<usize> {
        let raw = message.to_json()?;
        let mut delivered = 0;
        for peer in &mut self.peers {
            match peer.deliver(&raw) {
                Ok(()) => delivered += 1,
                Err(error) => warn!(peer = peer.name(), %error, "bus delivery failed"),
            }
        }
        self.sent += 1;
        trace!(peers = delivered, bytes = raw.len(), "bus message broadcast");
        Ok(delivered)
    }
}

/// Peer that decodes and keeps every message it receives.
#[derive(Debug, Clone)]
pub struct RecordingPeer {
    name: String,
    received: Rc<RefCell<Vec<BusMessage>>>,
}

impl RecordingPeer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: Rc::new(RefCell::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn received(&self) -> Vec<BusMessage> {
        self.received.borrow().clone()
    }
}

impl BusPeer for RecordingPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, message: &str) -> ViewerResult<()> {
        let decoded = BusMessage::from_json(message)?;
        self.received.borrow_mut().push(decoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BusMessage, MessageBus, RecordingPeer};

    #[test]
    fn message_uses_type_and_payload_envelope() {
        let message = BusMessage::ComputedChannelsUpdated {
            computed_channels: Vec::new(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&message.to_json().expect("json")).expect("value");
        assert_eq!(value["type"], "computed_channels_updated");
        assert!(value["payload"]["computedChannels"].as_array().is_some());
    }

    #[test]
    fn duplicate_peer_names_are_rejected() {
        let mut bus = MessageBus::new();
        let peer = RecordingPeer::new("popup");
        bus.connect(Box::new(peer.clone())).expect("connect");
        assert!(bus.connect(Box::new(RecordingPeer::new("popup"))).is_err());

        let delivered = bus
            .broadcast(&BusMessage::ComputedChannelDeleted { id: "computed_0".into() })
            .expect("broadcast");
        assert_eq!(delivered, 1);
        assert_eq!(peer.received().len(), 1);
        assert!(bus.disconnect("popup"));
        assert_eq!(bus.peer_count(), 0);
    }
}
