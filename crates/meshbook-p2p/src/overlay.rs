//! Capability traits at the seam between the overlay and the replication
//! protocol.

use std::sync::Arc;

use meshbook_types::{Channel, Result, WireMessage};

/// Consumer of inbound channel payloads.
///
/// Called from a channel reader task once per gossip message that did not
/// originate on this host. Errors are logged by the caller and do not stop
/// the reader.
pub trait Receiver: Send + Sync {
    fn receive(&self, buf: &[u8]) -> Result<()>;
}

/// What the replication protocol needs from the network.
pub trait Overlay: Send + Sync {
    /// Stable string form of this host's peer id.
    fn host_id(&self) -> String;

    /// Register the single inbound receiver, replacing any previous one.
    fn add_receiver(&self, receiver: Arc<dyn Receiver>);

    /// Queue `message` for broadcast on its channel. Never blocks; delivery
    /// is best effort.
    fn send(&self, message: WireMessage);

    /// Start receiving on `channel`. Subscribing twice is a no-op.
    fn subscribe(&self, channel: &Channel) -> Result<()>;

    /// Stop receiving on `channel`.
    ///
    /// # Errors
    /// `NotSubscribed` if the channel has no active subscription.
    fn unsubscribe(&self, channel: &Channel) -> Result<()>;
}
