//! Combined network behaviour of a meshbook host.

use std::time::Duration;

use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{gossipsub, identify, identity, kad, ping, relay, upnp};

use meshbook_types::constants::{
    DHT_QUERY_TIMEOUT_SECS, GOSSIP_HEARTBEAT_MS, IDENTIFY_PROTOCOL, NODE_NAME, VERSION,
};
use meshbook_types::MeshbookError;

#[derive(NetworkBehaviour)]
pub struct OverlayBehaviour {
    /// Channel traffic.
    pub gossipsub: gossipsub::Behaviour,
    /// DHT for bootstrap and rendezvous under the network id.
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    /// Circuit relay client, when relaying is enabled.
    pub relay_client: Toggle<relay::client::Behaviour>,
    /// Gateway port mapping, in NAT mode only.
    pub upnp: Toggle<upnp::tokio::Behaviour>,
}

impl OverlayBehaviour {
    pub fn new(
        key: &identity::Keypair,
        relay_client: Option<relay::client::Behaviour>,
        enable_upnp: bool,
    ) -> meshbook_types::Result<Self> {
        let local_peer_id = key.public().to_peer_id();

        let gossip_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_millis(GOSSIP_HEARTBEAT_MS))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .build()
            .map_err(|e| MeshbookError::HostCreation(format!("gossipsub config: {e}")))?;
        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(key.clone()),
            gossip_config,
        )
        .map_err(|e| MeshbookError::HostCreation(format!("gossipsub: {e}")))?;

        let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
        kad_config.set_query_timeout(Duration::from_secs(DHT_QUERY_TIMEOUT_SECS));
        let store = kad::store::MemoryStore::new(local_peer_id);
        let kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);

        let identify = identify::Behaviour::new(
            identify::Config::new(IDENTIFY_PROTOCOL.to_string(), key.public())
                .with_agent_version(format!("{NODE_NAME}/{VERSION}")),
        );

        let ping = ping::Behaviour::new(ping::Config::new());

        Ok(Self {
            gossipsub,
            kademlia,
            identify,
            ping,
            relay_client: Toggle::from(relay_client),
            upnp: Toggle::from(enable_upnp.then(upnp::tokio::Behaviour::default)),
        })
    }
}
