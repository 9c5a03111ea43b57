//! Listen and seed address handling.

use std::net::{IpAddr, Ipv4Addr};

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

use meshbook_types::{MeshbookError, P2pConfig, Result};

/// Address the host listens on: the explicit IP if configured, otherwise all
/// interfaces.
pub(crate) fn listen_addr(config: &P2pConfig) -> Multiaddr {
    let ip = config
        .external_ip
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    Multiaddr::empty()
        .with(Protocol::from(ip))
        .with(Protocol::Tcp(config.port))
}

/// NAT port mapping applies only when no explicit address is configured.
pub(crate) fn uses_nat_port_map(config: &P2pConfig) -> bool {
    config.external_ip.is_none() && config.enable_nat_port_map
}

/// Split a seed multiaddr into its peer id and dialable address.
pub(crate) fn parse_seed(seed: &str) -> Result<(PeerId, Multiaddr)> {
    let addr: Multiaddr = seed.parse().map_err(|e| MeshbookError::InvalidMultiaddr {
        addr: seed.to_string(),
        reason: format!("{e}"),
    })?;
    match addr.iter().last() {
        Some(Protocol::P2p(peer)) => Ok((peer, addr)),
        _ => Err(MeshbookError::InvalidMultiaddr {
            addr: seed.to_string(),
            reason: "missing /p2p/<peer id> suffix".to_string(),
        }),
    }
}
