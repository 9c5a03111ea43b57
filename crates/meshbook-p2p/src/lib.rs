//! # meshbook-p2p
//!
//! **Overlay transport**: the libp2p host every meshbook node runs.
//!
//! ## Architecture
//!
//! - TCP + Noise + Yamux transport with DNS resolution and an optional
//!   circuit relay client
//! - Kademlia DHT: seed bootstrap, then periodic advertise/query under the
//!   network id `"/meshbook/"` to find other meshbook nodes
//! - Gossipsub: one topic per channel, one reader task per subscribed channel
//! - UPnP port mapping when no explicit listen address is configured
//!
//! The replication protocol only sees the [`Overlay`] and [`Receiver`]
//! traits; [`OverlayNode`] is the libp2p implementation.

mod addrs;
pub mod behaviour;
pub mod node;
pub mod overlay;
mod subscription;
mod swarm_task;

pub use node::OverlayNode;
pub use overlay::{Overlay, Receiver};
