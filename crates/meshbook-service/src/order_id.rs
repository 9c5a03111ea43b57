//! Order id derivation.
//!
//! `id = HMAC-SHA256(signing_secret, encode(request) ‖ encode(created))`,
//! both encodings being the protobuf wire schema. Ids are unique per node as
//! long as creation timestamps are; [`OrderClock`] makes them strictly
//! increasing.

use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use prost::Message;
use sha2::Sha256;

use meshbook_types::{CreateRequest, MeshbookError, OrderId, Result, timestamp_from};

type HmacSha256 = Hmac<Sha256>;

/// Derive the id of an order created from `request` at `created`.
///
/// # Errors
/// Returns [`MeshbookError::Internal`] if the MAC cannot be keyed.
pub fn derive_order_id(
    secret: &[u8],
    request: &CreateRequest,
    created: DateTime<Utc>,
) -> Result<OrderId> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| MeshbookError::Internal(format!("order id key: {e}")))?;
    mac.update(&request.encode());
    mac.update(&timestamp_from(created).encode_to_vec());
    Ok(OrderId(mac.finalize().into_bytes().to_vec()))
}

/// Wall clock that never hands out the same instant twice.
#[derive(Debug, Default)]
pub struct OrderClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl OrderClock {
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + TimeDelta::nanoseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshbook_types::{AssetPair, ChannelId};

    fn request() -> CreateRequest {
        CreateRequest::new(
            ChannelId::for_pair(&AssetPair::new("BTC", "USD")),
            "BTC",
            "USD",
            5,
            35_000.0,
        )
    }

    #[test]
    fn id_is_a_sha256_mac() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let id = derive_order_id(b"secret", &request(), created).unwrap();
        assert_eq!(id.as_bytes().len(), 32);
    }

    #[test]
    fn same_inputs_same_id() {
        let created = DateTime::from_timestamp(1_700_000_000, 42).unwrap();
        let a = derive_order_id(b"secret", &request(), created).unwrap();
        let b = derive_order_id(b"secret", &request(), created).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn every_input_matters() {
        let created = DateTime::from_timestamp(1_700_000_000, 42).unwrap();
        let base = derive_order_id(b"secret", &request(), created).unwrap();

        let other_key = derive_order_id(b"other", &request(), created).unwrap();
        let other_time =
            derive_order_id(b"secret", &request(), created + TimeDelta::nanoseconds(1)).unwrap();
        let mut cheaper = request();
        cheaper.price = 34_999.0;
        let other_request = derive_order_id(b"secret", &cheaper, created).unwrap();

        assert_ne!(base, other_key);
        assert_ne!(base, other_time);
        assert_ne!(base, other_request);
    }

    #[test]
    fn empty_secret_still_keys() {
        let created = Utc::now();
        assert!(derive_order_id(&[], &request(), created).is_ok());
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = OrderClock::default();
        let mut prev = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }
}
