//! In-process overlay double for service tests.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use meshbook_p2p::{Overlay, Receiver};
use meshbook_types::{Channel, ChannelId, MeshbookError, Result, WireMessage};

/// Records everything the services ask of the network and delivers nothing.
pub struct RecordingOverlay {
    host_id: String,
    sent: Mutex<Vec<WireMessage>>,
    subscribed: Mutex<HashSet<ChannelId>>,
    fail_subscribe: Mutex<bool>,
}

impl RecordingOverlay {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            sent: Mutex::new(Vec::new()),
            subscribed: Mutex::new(HashSet::new()),
            fail_subscribe: Mutex::new(false),
        }
    }

    /// Messages passed to `send`, oldest first.
    pub fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn is_subscribed(&self, channel: &ChannelId) -> bool {
        self.subscribed.lock().contains(channel)
    }

    /// Make every later `subscribe` fail with `OverlayClosed`.
    pub fn fail_subscriptions(&self) {
        *self.fail_subscribe.lock() = true;
    }
}

impl Overlay for RecordingOverlay {
    fn host_id(&self) -> String {
        self.host_id.clone()
    }

    /// Inbound traffic is driven by calling the service directly.
    fn add_receiver(&self, _receiver: Arc<dyn Receiver>) {}

    fn send(&self, message: WireMessage) {
        self.sent.lock().push(message);
    }

    fn subscribe(&self, channel: &Channel) -> Result<()> {
        if *self.fail_subscribe.lock() {
            return Err(MeshbookError::OverlayClosed);
        }
        self.subscribed.lock().insert(channel.id.clone());
        Ok(())
    }

    fn unsubscribe(&self, channel: &Channel) -> Result<()> {
        if self.subscribed.lock().remove(&channel.id) {
            Ok(())
        } else {
            Err(MeshbookError::NotSubscribed(channel.id.clone()))
        }
    }
}
