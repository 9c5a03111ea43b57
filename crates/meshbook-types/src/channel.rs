//! Channel types.
//!
//! A channel is the application-level topic for one asset pair. Nodes that
//! join the same pair derive the same [`ChannelId`] and meet on the same
//! gossip topic.

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::{AssetPair, ChannelId, MeshbookError, Result, proto};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    /// Pair symbol, e.g. `"BTC,USD"`.
    pub asset_pair: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub options: ChannelOptions,
}

impl Channel {
    /// Channel for `pair`.
    ///
    /// # Errors
    /// Returns `InvalidAssetPair` if either asset name is empty or contains
    /// the pair separator.
    pub fn for_pair(pair: &AssetPair) -> Result<Self> {
        pair.validate()?;
        Ok(Self {
            id: ChannelId::for_pair(pair),
            options: ChannelOptions {
                asset_pair: pair.symbol(),
            },
        })
    }

    /// The asset pair named by the channel options.
    ///
    /// # Errors
    /// Returns `InvalidAssetPair` when the stored symbol cannot be parsed.
    pub fn pair(&self) -> Result<AssetPair> {
        AssetPair::parse(&self.options.asset_pair)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        proto::Channel::from(self).encode_to_vec()
    }

    /// # Errors
    /// Returns `MalformedChannel` for undecodable bytes or an empty id.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let raw = proto::Channel::decode(buf)
            .map_err(|e| MeshbookError::MalformedChannel(e.to_string()))?;
        Self::try_from(raw)
    }
}

impl From<&Channel> for proto::Channel {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id.0.clone(),
            options: Some(proto::ChannelOptions {
                asset_pair: channel.options.asset_pair.clone(),
            }),
        }
    }
}

impl TryFrom<proto::Channel> for Channel {
    type Error = MeshbookError;

    fn try_from(raw: proto::Channel) -> Result<Self> {
        if raw.id.is_empty() {
            return Err(MeshbookError::MalformedChannel("channel has no id".to_string()));
        }
        Ok(Self {
            id: ChannelId(raw.id),
            options: ChannelOptions {
                asset_pair: raw.options.map(|o| o.asset_pair).unwrap_or_default(),
            },
        })
    }
}
