//! # meshbook-service
//!
//! **Replication protocol** and channel membership: the logical surface an
//! API layer exposes.
//!
//! - [`OrderService`]: create, delete, lock, unlock, and query orders;
//!   applies replicated operations as the overlay's [`meshbook_p2p::Receiver`]
//! - [`ChannelService`]: join, leave, and list asset-pair channels
//!
//! Both work against the `Storage` and `Overlay` traits, so the same code
//! runs over sled and libp2p in a node and over in-memory doubles in tests.

pub mod channels;
pub mod order_id;
pub mod orders;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use channels::ChannelService;
pub use orders::OrderService;
