//! Order replication protocol.
//!
//! Local mutations are committed to storage and then broadcast on the
//! order's channel; broadcasts from other nodes arrive through
//! [`OrderService::receive`] and are applied to the same storage. There is
//! no coordination between nodes: each applies what it hears, last writer
//! wins.
//!
//! ```text
//!  create ──► derive id ──► put ──► send(CREATE)
//!  delete ──► get ──► send(DELETE) ──► remove
//!  lock   ──► get ──► creator? ──► OPEN→LOCKED ──► put ──► send(LOCK)
//!  unlock ──► get ──► creator? ──► LOCKED→OPEN ──► put ──► send(UNLOCK)
//!
//!  receive ──► decode envelope ──► decode order ──► apply op to storage
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use meshbook_p2p::{Overlay, Receiver};
use meshbook_storage::Storage;
use meshbook_types::constants::ORDER_PREFIX;
use meshbook_types::{
    ChannelId, CreateRequest, MeshbookError, Operation, Order, OrderId, OrderState, Result,
    WireMessage,
};

use crate::order_id::{OrderClock, derive_order_id};

/// Creates, mutates, and replicates orders for one node.
pub struct OrderService {
    storage: Arc<dyn Storage>,
    overlay: Arc<dyn Overlay>,
    signing_secret: Vec<u8>,
    clock: OrderClock,
}

impl OrderService {
    pub fn new(
        storage: Arc<dyn Storage>,
        overlay: Arc<dyn Overlay>,
        signing_secret: Vec<u8>,
    ) -> Self {
        Self {
            storage,
            overlay,
            signing_secret,
            clock: OrderClock::default(),
        }
    }

    /// Create an order, commit it locally, and broadcast it on the request's
    /// channel.
    ///
    /// # Errors
    /// - `InvalidOrder` for a request without a channel or with a non-finite price
    /// - `OrderNotPersisted` if the local commit fails; nothing is broadcast
    pub fn create(&self, request: &CreateRequest) -> Result<Order> {
        if request.channel_id.is_empty() {
            return Err(MeshbookError::InvalidOrder {
                reason: "request names no channel".to_string(),
            });
        }
        if !request.price.is_finite() {
            return Err(MeshbookError::InvalidOrder {
                reason: format!("price {} is not finite", request.price),
            });
        }

        let created = self.clock.now();
        let order = Order {
            id: derive_order_id(&self.signing_secret, request, created)?,
            created,
            asset: request.asset.clone(),
            counter_asset: request.counter_asset.clone(),
            amount: request.amount,
            price: request.price,
            state: OrderState::Open,
            origin: self.overlay.host_id().into_bytes(),
        };

        let encoded = order.encode();
        if let Err(e) = self.storage.put(&order.id.storage_key(), &encoded) {
            error!(order = %order.id, error = %e, "order created but not persisted");
            return Err(MeshbookError::OrderNotPersisted {
                reason: e.to_string(),
                order: Box::new(order),
            });
        }

        self.overlay.send(WireMessage::new(
            request.channel_id.clone(),
            Operation::Create,
            encoded,
        ));
        info!(
            order = %order.id,
            channel = %request.channel_id,
            pair = %order.pair(),
            amount = order.amount,
            price = order.price,
            "order created"
        );
        Ok(order)
    }

    /// Apply a wire message received from another node.
    ///
    /// # Errors
    /// Protocol errors (`MalformedWireMessage`, `MalformedOrder`,
    /// `UnknownOperation`) leave storage untouched. Storage errors are
    /// returned as is.
    pub fn receive(&self, buf: &[u8]) -> Result<()> {
        let message = WireMessage::decode(buf)?;
        let order = message.order()?;
        let key = order.id.storage_key();
        debug!(
            order = %order.id,
            channel = %message.channel_id,
            operation = %message.operation,
            "applying replicated operation"
        );

        match message.operation {
            Operation::Create => self.storage.put(&key, &order.encode()),
            Operation::Delete => self.storage.delete(&key),
            Operation::Lock => self.apply_state(&order.id, OrderState::Locked),
            Operation::Unlock => self.apply_state(&order.id, OrderState::Open),
        }
    }

    /// Rewrite only the state of a stored order. An order this node has not
    /// seen is left alone.
    fn apply_state(&self, id: &OrderId, state: OrderState) -> Result<()> {
        let key = id.storage_key();
        let Some(bytes) = self.storage.get(&key)? else {
            warn!(order = %id, state = %state, "state change for unknown order ignored");
            return Ok(());
        };
        let mut stored = Order::decode(&bytes)?;
        stored.state = state;
        self.storage.put(&key, &stored.encode())
    }

    pub fn get_order(&self, id: &OrderId) -> Result<Order> {
        let bytes = self
            .storage
            .get(&id.storage_key())?
            .ok_or_else(|| MeshbookError::OrderNotFound(id.clone()))?;
        Order::decode(&bytes)
    }

    /// Every stored order. Entries that no longer decode are skipped.
    pub fn get_all_orders(&self) -> Result<Vec<Order>> {
        let entries = self.storage.get_all_with_prefix(ORDER_PREFIX)?;
        let mut orders = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match Order::decode(&value) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(key = %String::from_utf8_lossy(&key), error = %e, "skipping stored order"),
            }
        }
        Ok(orders)
    }

    /// Broadcast the deletion of a stored order, then remove it.
    ///
    /// # Errors
    /// `OrderNotFound` if the order is not stored here.
    pub fn delete(&self, id: &OrderId, channel: &ChannelId) -> Result<()> {
        let key = id.storage_key();
        let bytes = self
            .storage
            .get(&key)?
            .ok_or_else(|| MeshbookError::OrderNotFound(id.clone()))?;
        self.overlay
            .send(WireMessage::new(channel.clone(), Operation::Delete, bytes));
        self.storage.delete(&key)?;
        info!(order = %id, channel = %channel, "order deleted");
        Ok(())
    }

    /// Lock an open order this node created.
    ///
    /// # Errors
    /// `OrderNotFound`, `NotOrderCreator`, or `InvalidStateTransition` when
    /// the order is already locked.
    pub fn lock(&self, id: &OrderId, channel: &ChannelId) -> Result<Order> {
        self.transition(id, channel, OrderState::Locked, Operation::Lock)
    }

    /// Unlock a locked order this node created.
    ///
    /// # Errors
    /// `OrderNotFound`, `NotOrderCreator`, or `InvalidStateTransition` when
    /// the order is already open.
    pub fn unlock(&self, id: &OrderId, channel: &ChannelId) -> Result<Order> {
        self.transition(id, channel, OrderState::Open, Operation::Unlock)
    }

    fn transition(
        &self,
        id: &OrderId,
        channel: &ChannelId,
        target: OrderState,
        operation: Operation,
    ) -> Result<Order> {
        let mut order = self.get_order(id)?;
        if !order.is_created_by(self.overlay.host_id().as_bytes()) {
            return Err(MeshbookError::NotOrderCreator(id.clone()));
        }
        order.transition(target)?;

        let encoded = order.encode();
        self.storage.put(&id.storage_key(), &encoded)?;
        self.overlay
            .send(WireMessage::new(channel.clone(), operation, encoded));
        info!(order = %id, channel = %channel, state = %order.state, "order state changed");
        Ok(order)
    }
}

impl Receiver for OrderService {
    fn receive(&self, buf: &[u8]) -> Result<()> {
        OrderService::receive(self, buf)
    }
}
