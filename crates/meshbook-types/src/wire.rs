//! Replication traffic.
//!
//! A [`WireMessage`] is the envelope every mutation travels in: which
//! channel it belongs to, what happened, and the serialized order it
//! happened to.

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, MeshbookError, Order, Result, proto};

/// Mutation kinds replicated between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Delete,
    Lock,
    Unlock,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Lock => write!(f, "LOCK"),
            Self::Unlock => write!(f, "UNLOCK"),
        }
    }
}

impl From<Operation> for proto::Operation {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Create => Self::Create,
            Operation::Delete => Self::Delete,
            Operation::Lock => Self::Lock,
            Operation::Unlock => Self::Unlock,
        }
    }
}

impl TryFrom<i32> for Operation {
    type Error = MeshbookError;

    fn try_from(value: i32) -> Result<Self> {
        match proto::Operation::try_from(value) {
            Ok(proto::Operation::Create) => Ok(Self::Create),
            Ok(proto::Operation::Delete) => Ok(Self::Delete),
            Ok(proto::Operation::Lock) => Ok(Self::Lock),
            Ok(proto::Operation::Unlock) => Ok(Self::Unlock),
            Err(_) => Err(MeshbookError::UnknownOperation(value)),
        }
    }
}

/// Envelope for one replicated mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub channel_id: ChannelId,
    pub operation: Operation,
    /// Serialized [`Order`].
    pub data: Vec<u8>,
}

impl WireMessage {
    #[must_use]
    pub fn new(channel_id: ChannelId, operation: Operation, data: Vec<u8>) -> Self {
        Self {
            channel_id,
            operation,
            data,
        }
    }

    /// Envelope carrying `order` encoded.
    #[must_use]
    pub fn for_order(channel_id: ChannelId, operation: Operation, order: &Order) -> Self {
        Self::new(channel_id, operation, order.encode())
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        proto::WireMessage {
            channel_id: self.channel_id.0.clone(),
            operation: proto::Operation::from(self.operation) as i32,
            data: self.data.clone(),
        }
        .encode_to_vec()
    }

    /// Decode an envelope received from the overlay.
    ///
    /// # Errors
    /// `MalformedWireMessage` for bytes that are not an envelope,
    /// `UnknownOperation` for an operation value this node does not know.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let raw = proto::WireMessage::decode(buf)
            .map_err(|e| MeshbookError::MalformedWireMessage(e.to_string()))?;
        let operation = Operation::try_from(raw.operation)?;
        Ok(Self {
            channel_id: ChannelId(raw.channel_id),
            operation,
            data: raw.data,
        })
    }

    /// Decode the embedded order.
    ///
    /// # Errors
    /// `MalformedOrder` if `data` is not a valid order.
    pub fn order(&self) -> Result<Order> {
        Order::decode(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetPair;

    fn channel() -> ChannelId {
        ChannelId::for_pair(&AssetPair::new("BTC", "USD"))
    }

    #[test]
    fn envelope_carries_order() {
        let order = Order::dummy("BTC", "USD", 5, 35_000.0);
        let msg = WireMessage::for_order(channel(), Operation::Lock, &order);
        let back = WireMessage::decode(&msg.encode()).unwrap();
        assert_eq!(back.operation, Operation::Lock);
        assert_eq!(back.channel_id, channel());
        assert_eq!(back.order().unwrap(), order);
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let raw = proto::WireMessage {
            channel_id: b"BTC,USD".to_vec(),
            operation: 42,
            data: Vec::new(),
        };
        let err = WireMessage::decode(&raw.encode_to_vec()).unwrap_err();
        assert!(matches!(err, MeshbookError::UnknownOperation(42)));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = WireMessage::decode(&[0x0a, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, MeshbookError::MalformedWireMessage(_)));
    }

    #[test]
    fn empty_data_is_not_an_order() {
        let msg = WireMessage::new(channel(), Operation::Create, Vec::new());
        let back = WireMessage::decode(&msg.encode()).unwrap();
        assert!(matches!(back.order(), Err(MeshbookError::MalformedOrder(_))));
    }

    #[test]
    fn operation_display() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Unlock.to_string(), "UNLOCK");
    }
}
