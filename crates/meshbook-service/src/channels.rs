//! Channel membership.
//!
//! Joined channels are persisted so a restarted node can rejoin them before
//! it starts serving requests.

use std::sync::Arc;

use tracing::{info, warn};

use meshbook_p2p::Overlay;
use meshbook_storage::Storage;
use meshbook_types::constants::CHANNEL_PREFIX;
use meshbook_types::{AssetPair, Channel, ChannelId, MeshbookError, Result};

pub struct ChannelService {
    storage: Arc<dyn Storage>,
    overlay: Arc<dyn Overlay>,
}

impl ChannelService {
    pub fn new(storage: Arc<dyn Storage>, overlay: Arc<dyn Overlay>) -> Self {
        Self { storage, overlay }
    }

    /// Join the channel for `asset`/`counter_asset`: persist it and subscribe.
    ///
    /// Joining a channel twice returns the same channel.
    ///
    /// # Errors
    /// `InvalidAssetPair` for unusable asset names; storage and overlay
    /// errors otherwise. A failed subscribe leaves storage as it was: a new
    /// channel is not persisted, an already joined one is kept.
    pub fn join(&self, asset: &str, counter_asset: &str) -> Result<Channel> {
        let channel = Channel::for_pair(&AssetPair::new(asset, counter_asset))?;
        let key = channel.id.storage_key();
        let already_joined = self.storage.get(&key)?.is_some();
        if !already_joined {
            self.storage.put(&key, &channel.encode())?;
        }
        if let Err(e) = self.overlay.subscribe(&channel) {
            if !already_joined {
                if let Err(rollback) = self.storage.delete(&key) {
                    warn!(channel = %channel.id, error = %rollback, "could not roll back channel");
                }
            }
            return Err(e);
        }
        info!(channel = %channel.id, pair = %channel.options.asset_pair, "joined channel");
        Ok(channel)
    }

    /// Leave a joined channel: unsubscribe and forget it.
    ///
    /// # Errors
    /// `ChannelNotFound` if the channel was never joined here.
    pub fn leave(&self, id: &ChannelId) -> Result<()> {
        let channel = self.get_channel(id)?;
        match self.overlay.unsubscribe(&channel) {
            Ok(()) => {}
            Err(MeshbookError::NotSubscribed(_)) => {
                warn!(channel = %id, "leaving a channel that had no live subscription");
            }
            Err(e) => return Err(e),
        }
        self.storage.delete(&id.storage_key())?;
        info!(channel = %id, "left channel");
        Ok(())
    }

    pub fn get_channel(&self, id: &ChannelId) -> Result<Channel> {
        let bytes = self
            .storage
            .get(&id.storage_key())?
            .ok_or_else(|| MeshbookError::ChannelNotFound(id.clone()))?;
        Channel::decode(&bytes)
    }

    /// Every joined channel. Entries that no longer decode are skipped.
    pub fn get_all_channels(&self) -> Result<Vec<Channel>> {
        let entries = self.storage.get_all_with_prefix(CHANNEL_PREFIX)?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| match Channel::decode(&value) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), error = %e, "skipping stored channel");
                    None
                }
            })
            .collect())
    }

    /// Subscribe to every persisted channel. Returns how many succeeded;
    /// failures are logged.
    pub fn rejoin_all(&self) -> Result<usize> {
        let channels = self.get_all_channels()?;
        let mut joined = 0;
        for channel in &channels {
            match self.overlay.subscribe(channel) {
                Ok(()) => joined += 1,
                Err(e) => warn!(channel = %channel.id, error = %e, "could not rejoin channel"),
            }
        }
        info!(joined, total = channels.len(), "rejoined persisted channels");
        Ok(joined)
    }
}
