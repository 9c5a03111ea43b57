//! Identifiers used throughout meshbook.
//!
//! Order and channel ids are opaque byte strings on the wire. They are shown
//! as lowercase hex in logs and error messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MeshbookError, Result, constants};

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Order identifier: a keyed digest over the create request and its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Vec<u8>);

impl OrderId {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a hex-encoded id, as printed by [`fmt::Display`].
    pub fn from_hex(hex_id: &str) -> Result<Self> {
        hex::decode(hex_id)
            .map(Self)
            .map_err(|e| MeshbookError::InvalidOrder {
                reason: format!("order id is not hex: {e}"),
            })
    }

    /// Storage key of this order: `ORDER_PREFIX ‖ id`.
    #[must_use]
    pub fn storage_key(&self) -> Vec<u8> {
        [constants::ORDER_PREFIX, self.0.as_slice()].concat()
    }

    /// First four bytes as hex, for compact log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

// ---------------------------------------------------------------------------
// AssetPair
// ---------------------------------------------------------------------------

/// The traded pair a channel is dedicated to (e.g., BTC against USD).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetPair {
    pub asset: String,
    pub counter_asset: String,
}

impl AssetPair {
    #[must_use]
    pub fn new(asset: impl Into<String>, counter_asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            counter_asset: counter_asset.into(),
        }
    }

    /// Reject pairs that cannot name a channel unambiguously.
    pub fn validate(&self) -> Result<()> {
        for name in [&self.asset, &self.counter_asset] {
            if name.is_empty() {
                return Err(MeshbookError::InvalidAssetPair {
                    reason: "asset names must not be empty".to_string(),
                });
            }
            if name.contains(constants::ASSET_PAIR_SEPARATOR) {
                return Err(MeshbookError::InvalidAssetPair {
                    reason: format!(
                        "asset name {name:?} contains the separator {:?}",
                        constants::ASSET_PAIR_SEPARATOR
                    ),
                });
            }
        }
        Ok(())
    }

    /// The pair string stored in channel options, e.g. `"BTC,USD"`.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!(
            "{}{}{}",
            self.asset,
            constants::ASSET_PAIR_SEPARATOR,
            self.counter_asset
        )
    }

    /// Inverse of [`AssetPair::symbol`].
    pub fn parse(symbol: &str) -> Result<Self> {
        let (asset, counter_asset) = symbol
            .split_once(constants::ASSET_PAIR_SEPARATOR)
            .ok_or_else(|| MeshbookError::InvalidAssetPair {
                reason: format!("{symbol:?} is not of the form ASSET,COUNTER"),
            })?;
        let pair = Self::new(asset.trim(), counter_asset.trim());
        pair.validate()?;
        Ok(pair)
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset, self.counter_asset)
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Channel identifier. Derived from the asset pair so that every node
/// joining the same pair lands on the same gossip topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ChannelId(pub Vec<u8>);

impl ChannelId {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn for_pair(pair: &AssetPair) -> Self {
        Self(pair.symbol().into_bytes())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a hex-encoded id, as printed by [`fmt::Display`].
    pub fn from_hex(hex_id: &str) -> Result<Self> {
        hex::decode(hex_id)
            .map(Self)
            .map_err(|e| MeshbookError::InvalidAssetPair {
                reason: format!("channel id is not hex: {e}"),
            })
    }

    /// Name of the gossip topic this channel maps onto.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("{}{}", constants::CHANNEL_TOPIC_PREFIX, hex::encode(&self.0))
    }

    /// Storage key of this channel: `CHANNEL_PREFIX ‖ id`.
    #[must_use]
    pub fn storage_key(&self) -> Vec<u8> {
        [constants::CHANNEL_PREFIX, self.0.as_slice()].concat()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_hex_roundtrip() {
        let id = OrderId::from_bytes(vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
        assert_eq!(id.to_string(), "deadbeef01");
        assert_eq!(id.short(), "deadbeef");
        assert_eq!(OrderId::from_hex("deadbeef01").unwrap(), id);
        assert!(OrderId::from_hex("not hex").is_err());
    }

    #[test]
    fn order_storage_key_is_prefixed() {
        let id = OrderId::from_bytes(vec![1, 2, 3]);
        assert_eq!(id.storage_key(), b"order:\x01\x02\x03".to_vec());
    }

    #[test]
    fn short_handles_tiny_ids() {
        assert_eq!(OrderId::from_bytes(vec![7]).short(), "07");
        assert_eq!(OrderId::from_bytes(Vec::new()).short(), "");
    }

    #[test]
    fn asset_pair_symbol_and_parse() {
        let pair = AssetPair::new("BTC", "USD");
        assert_eq!(pair.symbol(), "BTC,USD");
        assert_eq!(pair.to_string(), "BTC/USD");
        assert_eq!(AssetPair::parse("BTC, USD").unwrap(), pair);
        assert!(AssetPair::parse("BTCUSD").is_err());
        assert!(AssetPair::parse(",USD").is_err());
    }

    #[test]
    fn asset_pair_rejects_separator_in_name() {
        let err = AssetPair::new("BT,C", "USD").validate().unwrap_err();
        assert!(matches!(err, MeshbookError::InvalidAssetPair { .. }));
    }

    #[test]
    fn channel_id_is_deterministic_per_pair() {
        let a = ChannelId::for_pair(&AssetPair::new("BTC", "USD"));
        let b = ChannelId::for_pair(&AssetPair::new("BTC", "USD"));
        let c = ChannelId::for_pair(&AssetPair::new("USD", "BTC"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.topic(), b.topic());
        assert!(a.topic().starts_with(constants::CHANNEL_TOPIC_PREFIX));
    }

    #[test]
    fn channel_storage_key_is_prefixed() {
        let id = ChannelId::for_pair(&AssetPair::new("ETH", "EUR"));
        assert_eq!(id.storage_key(), b"channel:ETH,EUR".to_vec());
    }

    #[test]
    fn serde_roundtrips() {
        let oid = OrderId::from_bytes(vec![9, 8, 7]);
        let json = serde_json::to_string(&oid).unwrap();
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(oid, back);

        let pair = AssetPair::new("BTC", "USD");
        let json = serde_json::to_string(&pair).unwrap();
        let back: AssetPair = serde_json::from_str(&json).unwrap();
        assert_eq!(pair, back);
    }
}
