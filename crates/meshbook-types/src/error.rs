//! Error types for meshbook nodes.
//!
//! All errors use the `MB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Channel errors
//! - 3xx: Protocol data errors (malformed wire payloads)
//! - 4xx: Storage errors
//! - 5xx: Network errors
//! - 6xx: Identity errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{ChannelId, Order, OrderId, OrderState};

/// Central error enum for all meshbook operations.
#[derive(Debug, Error)]
pub enum MeshbookError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The requested order is not stored on this node.
    #[error("MB_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order failed validation (missing fields, bad values, etc.).
    #[error("MB_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The order was constructed but the local commit failed. The order is
    /// carried along so the caller still sees what was attempted.
    #[error("MB_ERR_102: Order {id} created but not persisted: {reason}", id = .order.id)]
    OrderNotPersisted { order: Box<Order>, reason: String },

    /// The requested state change is not an edge of the order state machine.
    #[error("MB_ERR_103: Order {order_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        order_id: OrderId,
        from: OrderState,
        to: OrderState,
    },

    /// Only the node that created an order may lock or unlock it.
    #[error("MB_ERR_104: Order {0} was not created by this node")]
    NotOrderCreator(OrderId),

    // =================================================================
    // Channel Errors (2xx)
    // =================================================================
    /// The requested channel has not been joined on this node.
    #[error("MB_ERR_200: Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// Unsubscribe was called for a channel without an active subscription.
    #[error("MB_ERR_201: Channel {0} has no active subscription")]
    NotSubscribed(ChannelId),

    /// The asset pair cannot name a channel.
    #[error("MB_ERR_202: Invalid asset pair: {reason}")]
    InvalidAssetPair { reason: String },

    // =================================================================
    // Protocol Data Errors (3xx)
    // =================================================================
    /// The received buffer is not a valid wire message.
    #[error("MB_ERR_300: Malformed wire message: {0}")]
    MalformedWireMessage(String),

    /// The embedded order payload is not a valid order.
    #[error("MB_ERR_301: Malformed order payload: {0}")]
    MalformedOrder(String),

    /// The wire message names an operation this node does not know.
    #[error("MB_ERR_302: Unknown operation: {0}")]
    UnknownOperation(i32),

    /// A stored or received channel payload could not be decoded.
    #[error("MB_ERR_303: Malformed channel payload: {0}")]
    MalformedChannel(String),

    // =================================================================
    // Storage Errors (4xx)
    // =================================================================
    /// The storage engine failed a read, write, or scan.
    #[error("MB_ERR_400: Storage error: {0}")]
    Storage(String),

    // =================================================================
    // Network Errors (5xx)
    // =================================================================
    /// The overlay host could not be created. Fatal to startup.
    #[error("MB_ERR_500: Host creation failed: {0}")]
    HostCreation(String),

    /// Dialing a peer failed.
    #[error("MB_ERR_501: Peer connection failed: {reason}")]
    PeerConnectionFailed { reason: String },

    /// The overlay has been closed or was never started.
    #[error("MB_ERR_502: Overlay is not running")]
    OverlayClosed,

    /// A multiaddress could not be parsed or is missing its peer id.
    #[error("MB_ERR_503: Invalid multiaddress {addr}: {reason}")]
    InvalidMultiaddr { addr: String, reason: String },

    // =================================================================
    // Identity Errors (6xx)
    // =================================================================
    /// Stored key material exists but cannot be decoded.
    #[error("MB_ERR_600: Stored identity is corrupt: {0}")]
    IdentityCorrupt(String),

    /// Key material could not be encoded for storage.
    #[error("MB_ERR_601: Key encoding failed: {0}")]
    KeyEncoding(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("MB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config file, bad override, etc.).
    #[error("MB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("MB_ERR_903: I/O error: {0}")]
    Io(String),
}

impl MeshbookError {
    /// Whether this error means "the thing is absent" rather than a failure
    /// of the storage or transport underneath.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::OrderNotFound(_) | Self::ChannelNotFound(_))
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, MeshbookError>;

// Conversion from std::io::Error
impl From<std::io::Error> for MeshbookError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
