//! Per-channel subscription bookkeeping.

use std::collections::HashMap;

use tokio::sync::oneshot;

use meshbook_types::{ChannelId, MeshbookError, Result};

struct Subscription {
    generation: u64,
    /// `None` once cancellation has been requested and the reader is winding
    /// down.
    quit: Option<oneshot::Sender<()>>,
}

/// Channel id → quit signal and generation of its reader.
///
/// A channel is active while its entry still holds a quit signal. Each
/// subscribe bumps the generation so that a reader which exits late cannot
/// remove its successor's entry.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: HashMap<ChannelId, Subscription>,
    next_generation: u64,
}

impl SubscriptionTable {
    pub(crate) fn is_active(&self, channel: &ChannelId) -> bool {
        self.entries
            .get(channel)
            .is_some_and(|s| s.quit.is_some())
    }

    /// Register a new reader for `channel`, replacing any winding-down entry.
    pub(crate) fn open(&mut self, channel: ChannelId) -> (u64, oneshot::Receiver<()>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let (quit, quit_rx) = oneshot::channel();
        self.entries.insert(
            channel,
            Subscription {
                generation,
                quit: Some(quit),
            },
        );
        (generation, quit_rx)
    }

    /// Trip the quit signal of `channel`'s reader.
    pub(crate) fn cancel(&mut self, channel: &ChannelId) -> Result<()> {
        let quit = self
            .entries
            .get_mut(channel)
            .and_then(|s| s.quit.take())
            .ok_or_else(|| MeshbookError::NotSubscribed(channel.clone()))?;
        // The reader may already be gone; nothing to signal then.
        let _ = quit.send(());
        Ok(())
    }

    /// Drop `channel`'s entry if it still belongs to `generation`.
    pub(crate) fn remove_if_current(&mut self, channel: &ChannelId, generation: u64) -> bool {
        if self
            .entries
            .get(channel)
            .is_some_and(|s| s.generation == generation)
        {
            self.entries.remove(channel);
            true
        } else {
            false
        }
    }

    /// Number of channels with an active subscription.
    pub(crate) fn active(&self) -> usize {
        self.entries.values().filter(|s| s.quit.is_some()).count()
    }
}
