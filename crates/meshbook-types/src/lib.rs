//! # meshbook-types
//!
//! Shared types, errors, wire schema, and configuration for **meshbook** nodes.
//!
//! The leaf crate of the workspace; every other crate depends on it.
//!
//! - **Identifiers**: [`OrderId`], [`ChannelId`], [`AssetPair`]
//! - **Order model**: [`Order`], [`OrderState`], [`CreateRequest`]
//! - **Channel model**: [`Channel`], [`ChannelOptions`]
//! - **Replication traffic**: [`WireMessage`], [`Operation`]
//! - **Wire schema**: protobuf messages in [`proto`]
//! - **Configuration**: [`NodeConfig`], [`P2pConfig`], [`LogConfig`]
//! - **Errors**: [`MeshbookError`] with `MB_ERR_` prefix codes
//! - **Constants**: storage key prefixes, network id, timeouts and defaults

pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod order;
pub mod proto;
pub mod wire;

// Re-export all primary types at crate root for ergonomic imports:
//   use meshbook_types::{Order, OrderState, WireMessage, ...};

pub use channel::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use order::*;
pub use wire::*;

// Constants are accessed via `meshbook_types::constants::FOO` and protobuf
// messages via `meshbook_types::proto::Foo` (not re-exported to avoid name
// collisions with the domain types).
