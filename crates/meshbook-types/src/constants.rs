//! System-wide constants for meshbook nodes.

/// Identifier every node of this deployment advertises and queries in the
/// DHT, independent of the asset pairs it trades.
pub const NETWORK_ID: &str = "/meshbook/";

/// Prefix of the gossip topic a channel is mapped onto.
pub const CHANNEL_TOPIC_PREFIX: &str = "/meshbook/channel/";

/// Protocol string announced through identify.
pub const IDENTIFY_PROTOCOL: &str = "/meshbook/id/1.0.0";

/// Storage namespace for orders. Keys are `ORDER_PREFIX ‖ raw order id`.
pub const ORDER_PREFIX: &[u8] = b"order:";

/// Storage namespace for joined channels. Keys are `CHANNEL_PREFIX ‖ raw channel id`.
pub const CHANNEL_PREFIX: &[u8] = b"channel:";

/// Storage key of the node's private key material.
pub const PRIVATE_KEY_KEY: &[u8] = b"private_key";

/// Storage key of the node's public key material.
pub const PUBLIC_KEY_KEY: &[u8] = b"public_key";

/// Separator between the two assets in a channel's asset pair string.
pub const ASSET_PAIR_SEPARATOR: char = ',';

/// Default TCP port for the overlay host.
pub const DEFAULT_P2P_PORT: u16 = 4001;

/// Default on-disk location of the node database.
pub const DEFAULT_DATABASE_PATH: &str = "/var/lib/meshbook/data";

/// Default `tracing` filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Well-known seed peers used to enter the DHT when none are configured.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

/// Maximum number of seed peers dialed at the same time during bootstrap.
pub const BOOTSTRAP_CONCURRENCY: usize = 8;

/// Per-peer timeout for a bootstrap dial, in seconds.
pub const BOOTSTRAP_DIAL_TIMEOUT_SECS: u64 = 10;

/// Interval between DHT re-advertisements and peer queries, in seconds.
pub const DISCOVERY_INTERVAL_SECS: u64 = 120;

/// Timeout for a single Kademlia query, in seconds.
pub const DHT_QUERY_TIMEOUT_SECS: u64 = 10;

/// Gossipsub heartbeat interval in milliseconds.
pub const GOSSIP_HEARTBEAT_MS: u64 = 1000;

/// Idle connections are closed after this many seconds.
pub const IDLE_CONNECTION_TIMEOUT_SECS: u64 = 60;

/// Grace period given to background tasks to stop on close, in milliseconds.
pub const SHUTDOWN_GRACE_MS: u64 = 5000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Node software name, used as the identify agent version prefix.
pub const NODE_NAME: &str = "meshbook";
