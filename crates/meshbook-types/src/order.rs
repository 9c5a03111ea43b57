//! Order types for meshbook.
//!
//! An order is created once, on the node that received the create intent,
//! and then replicated to every node subscribed to its channel. Each node
//! keeps its own copy; there is no owning node after the broadcast.

use chrono::{DateTime, Utc};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::{AssetPair, ChannelId, MeshbookError, OrderId, Result, proto};

/// Lifecycle state of an order.
///
/// Orders enter at `Open`; the only edges are `Open → Locked` and
/// `Locked → Open`. Deletion removes the order outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderState {
    Open,
    Locked,
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Locked => write!(f, "LOCKED"),
        }
    }
}

impl From<OrderState> for proto::State {
    fn from(state: OrderState) -> Self {
        match state {
            OrderState::Open => Self::Open,
            OrderState::Locked => Self::Locked,
        }
    }
}

impl From<proto::State> for OrderState {
    fn from(state: proto::State) -> Self {
        match state {
            proto::State::Open => Self::Open,
            proto::State::Locked => Self::Locked,
        }
    }
}

/// A trade intent replicated across the channel for its asset pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Creation time on the creator's clock.
    pub created: DateTime<Utc>,
    pub asset: String,
    pub counter_asset: String,
    pub amount: u64,
    pub price: f64,
    pub state: OrderState,
    /// Peer id bytes of the creating node. Empty for payloads from nodes
    /// that predate the field.
    pub origin: Vec<u8>,
}

impl Order {
    #[must_use]
    pub fn pair(&self) -> AssetPair {
        AssetPair::new(&self.asset, &self.counter_asset)
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state == OrderState::Locked
    }

    /// Whether `origin` (peer id bytes) created this order.
    #[must_use]
    pub fn is_created_by(&self, origin: &[u8]) -> bool {
        !self.origin.is_empty() && self.origin == origin
    }

    /// Move to `target` along a state machine edge.
    ///
    /// # Errors
    /// Returns `InvalidStateTransition` when already in `target`.
    pub fn transition(&mut self, target: OrderState) -> Result<()> {
        if self.state == target {
            return Err(MeshbookError::InvalidStateTransition {
                order_id: self.id.clone(),
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    /// Serialize with the protobuf wire schema.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        proto::Order::from(self).encode_to_vec()
    }

    /// Deserialize and validate a protobuf order payload.
    ///
    /// # Errors
    /// Returns `MalformedOrder` if the bytes are not an order or the order
    /// has no id, an unknown state, or an out-of-range timestamp.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let raw = proto::Order::decode(buf)
            .map_err(|e| MeshbookError::MalformedOrder(e.to_string()))?;
        Self::try_from(raw)
    }
}

impl From<&Order> for proto::Order {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.0.clone(),
            created: Some(timestamp_from(order.created)),
            asset: order.asset.clone(),
            counter_asset: order.counter_asset.clone(),
            amount: order.amount,
            price: order.price,
            state: proto::State::from(order.state) as i32,
            origin: order.origin.clone(),
        }
    }
}

impl TryFrom<proto::Order> for Order {
    type Error = MeshbookError;

    fn try_from(raw: proto::Order) -> Result<Self> {
        if raw.id.is_empty() {
            return Err(MeshbookError::MalformedOrder("order has no id".to_string()));
        }
        let state = proto::State::try_from(raw.state)
            .map_err(|_| MeshbookError::MalformedOrder(format!("unknown state {}", raw.state)))?;
        let created = match raw.created {
            Some(ts) => datetime_from(&ts)?,
            None => DateTime::<Utc>::default(),
        };
        Ok(Self {
            id: OrderId(raw.id),
            created,
            asset: raw.asset,
            counter_asset: raw.counter_asset,
            amount: raw.amount,
            price: raw.price,
            state: state.into(),
            origin: raw.origin,
        })
    }
}

/// Convert a UTC time to a protobuf timestamp.
#[must_use]
pub fn timestamp_from(time: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: time.timestamp(),
        nanos: i32::try_from(time.timestamp_subsec_nanos()).unwrap_or(i32::MAX),
    }
}

fn datetime_from(ts: &prost_types::Timestamp) -> Result<DateTime<Utc>> {
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
        .ok_or_else(|| {
            MeshbookError::MalformedOrder(format!(
                "timestamp out of range: {}s {}ns",
                ts.seconds, ts.nanos
            ))
        })
}

/// A client's intent to create an order on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub channel_id: ChannelId,
    pub asset: String,
    pub counter_asset: String,
    pub amount: u64,
    pub price: f64,
}

impl CreateRequest {
    #[must_use]
    pub fn new(
        channel_id: ChannelId,
        asset: impl Into<String>,
        counter_asset: impl Into<String>,
        amount: u64,
        price: f64,
    ) -> Self {
        Self {
            channel_id,
            asset: asset.into(),
            counter_asset: counter_asset.into(),
            amount,
            price,
        }
    }

    /// Deterministic protobuf bytes of this request, the input to order-id
    /// derivation together with the creation timestamp.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        proto::CreateRequest {
            channel_id: self.channel_id.0.clone(),
            asset: self.asset.clone(),
            counter_asset: self.counter_asset.clone(),
            amount: self.amount,
            price: self.price,
        }
        .encode_to_vec()
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(asset: &str, counter_asset: &str, amount: u64, price: f64) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: OrderId(NEXT_ID.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec()),
            created: Utc::now(),
            asset: asset.to_string(),
            counter_asset: counter_asset.to_string(),
            amount,
            price,
            state: OrderState::Open,
            origin: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_order(rng: &mut impl Rng) -> Order {
        let id_len = rng.gen_range(1..=64);
        let id: Vec<u8> = (0..id_len).map(|_| rng.gen_range(0..=u8::MAX)).collect();
        let seconds = rng.gen_range(0..=4_102_444_800_i64);
        let nanos = rng.gen_range(0..1_000_000_000_u32);
        Order {
            id: OrderId(id),
            created: DateTime::from_timestamp(seconds, nanos).unwrap(),
            asset: format!("A{}", rng.gen_range(0..1000)),
            counter_asset: format!("C{}", rng.gen_range(0..1000)),
            amount: rng.gen_range(0..=u64::MAX),
            price: rng.gen_range(-1.0e12..1.0e12),
            state: if rng.gen_bool(0.5) {
                OrderState::Open
            } else {
                OrderState::Locked
            },
            origin: (0..rng.gen_range(0..40)).map(|_| rng.gen_range(0..=u8::MAX)).collect(),
        }
    }

    #[test]
    fn randomized_roundtrip() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let order = random_order(&mut rng);
            let back = Order::decode(&order.encode()).unwrap();
            assert_eq!(order, back);
        }
    }

    #[test]
    fn boundary_values_roundtrip() {
        let amounts = [0, 1, u64::MAX];
        let prices = [0.0, -0.0, -1.5, f64::MIN_POSITIVE, 1.0e300, -1.0e300, f64::MAX];
        for amount in amounts {
            for price in prices {
                let order = Order::dummy("BTC", "USD", amount, price);
                let back = Order::decode(&order.encode()).unwrap();
                assert_eq!(back.amount, amount);
                assert_eq!(back.price.to_bits(), price.to_bits());
                assert_eq!(order, back);
            }
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = Order::decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, MeshbookError::MalformedOrder(_)));
    }

    #[test]
    fn decode_rejects_missing_id() {
        let raw = proto::Order {
            asset: "BTC".into(),
            ..Default::default()
        };
        let err = Order::decode(&raw.encode_to_vec()).unwrap_err();
        assert!(matches!(err, MeshbookError::MalformedOrder(_)));
    }

    #[test]
    fn decode_rejects_unknown_state() {
        let raw = proto::Order {
            id: vec![1],
            state: 7,
            ..Default::default()
        };
        assert!(Order::decode(&raw.encode_to_vec()).is_err());
    }

    #[test]
    fn decode_rejects_negative_nanos() {
        let raw = proto::Order {
            id: vec![1],
            created: Some(prost_types::Timestamp {
                seconds: 10,
                nanos: -5,
            }),
            ..Default::default()
        };
        assert!(Order::decode(&raw.encode_to_vec()).is_err());
    }

    #[test]
    fn transitions_follow_state_machine() {
        let mut order = Order::dummy("BTC", "USD", 1, 1.0);
        order.transition(OrderState::Locked).unwrap();
        assert!(order.is_locked());
        let err = order.transition(OrderState::Locked).unwrap_err();
        assert!(matches!(err, MeshbookError::InvalidStateTransition { .. }));
        order.transition(OrderState::Open).unwrap();
        assert_eq!(order.state, OrderState::Open);
    }

    #[test]
    fn creator_check_requires_origin() {
        let mut order = Order::dummy("BTC", "USD", 1, 1.0);
        assert!(!order.is_created_by(&[]));
        order.origin = vec![1, 2, 3];
        assert!(order.is_created_by(&[1, 2, 3]));
        assert!(!order.is_created_by(&[3, 2, 1]));
    }

    #[test]
    fn create_request_encoding_is_deterministic() {
        let channel = ChannelId::for_pair(&AssetPair::new("BTC", "USD"));
        let a = CreateRequest::new(channel.clone(), "BTC", "USD", 5, 35_000.0);
        let b = CreateRequest::new(channel, "BTC", "USD", 5, 35_000.0);
        assert_eq!(a.encode(), b.encode());
        let c = CreateRequest { amount: 6, ..a.clone() };
        assert_ne!(a.encode(), c.encode());
    }

    #[test]
    fn order_state_display() {
        assert_eq!(format!("{}", OrderState::Open), "OPEN");
        assert_eq!(format!("{}", OrderState::Locked), "LOCKED");
    }
}
