//! Protobuf wire schema.
//!
//! Every message is field-numbered so nodes running different versions can
//! talk to each other: unknown fields are skipped on decode and missing
//! fields take their default. Field numbers are part of the protocol and
//! must never be reused.
//!
//! Domain code works with the types at the crate root; these messages only
//! exist at the serialization boundary (gossip payloads, storage values, and
//! the external API layer).

use prost::Message;

/// Lifecycle state of a replicated order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum State {
    Open = 0,
    Locked = 1,
}

/// Mutation carried by a [`WireMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Operation {
    Create = 0,
    Delete = 1,
    Lock = 2,
    Unlock = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct Order {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub created: Option<prost_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub asset: String,
    #[prost(string, tag = "4")]
    pub counter_asset: String,
    #[prost(uint64, tag = "5")]
    pub amount: u64,
    #[prost(double, tag = "6")]
    pub price: f64,
    #[prost(enumeration = "State", tag = "7")]
    pub state: i32,
    #[prost(bytes = "vec", tag = "8")]
    pub origin: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelOptions {
    #[prost(string, tag = "1")]
    pub asset_pair: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Channel {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub options: Option<ChannelOptions>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_id: Vec<u8>,
    #[prost(enumeration = "Operation", tag = "2")]
    pub operation: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub channel_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub asset: String,
    #[prost(string, tag = "3")]
    pub counter_asset: String,
    #[prost(uint64, tag = "4")]
    pub amount: u64,
    #[prost(double, tag = "5")]
    pub price: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateResponse {
    #[prost(message, optional, tag = "1")]
    pub created_order: Option<Order>,
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinRequest {
    #[prost(string, tag = "1")]
    pub asset: String,
    #[prost(string, tag = "2")]
    pub counter_asset: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinResponse {
    #[prost(message, optional, tag = "1")]
    pub joined_channel: Option<Channel>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderSpecificRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub order_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub channel_id: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelSpecificRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OrderListResponse {
    #[prost(message, repeated, tag = "1")]
    pub orders: Vec<Order>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelListResponse {
    #[prost(message, repeated, tag = "1")]
    pub channels: Vec<Channel>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Empty {}
