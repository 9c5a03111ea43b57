//! The task that owns the libp2p swarm.
//!
//! Nothing else touches the `Swarm`. Other tasks talk to it through
//! [`SwarmCommand`]s; inbound gossip is routed out per topic and discovered
//! peers are handed to the connector.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, TopicHash};
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{DialError, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, identify, kad, relay, upnp};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use meshbook_types::constants::{DISCOVERY_INTERVAL_SECS, NETWORK_ID};
use meshbook_types::{MeshbookError, Result};

use crate::behaviour::{OverlayBehaviour, OverlayBehaviourEvent};

/// A gossip message handed to a channel reader.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub source: Option<PeerId>,
    pub data: Vec<u8>,
}

pub(crate) enum SwarmCommand {
    Publish {
        topic: IdentTopic,
        data: Vec<u8>,
    },
    Subscribe {
        topic: IdentTopic,
        generation: u64,
        route: mpsc::UnboundedSender<Inbound>,
    },
    /// Leave `topic` if its route still belongs to `generation`.
    Unsubscribe {
        topic: IdentTopic,
        generation: u64,
    },
    Dial {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        /// Resolved once the connection is up or has failed.
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Reserve a relay slot through `relay` and listen on it.
    ListenViaRelay {
        relay: Multiaddr,
    },
    BootstrapDht,
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    TopicPeers {
        topic: TopicHash,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
}

struct Route {
    generation: u64,
    sender: mpsc::UnboundedSender<Inbound>,
}

pub(crate) struct SwarmTask {
    swarm: Swarm<OverlayBehaviour>,
    commands: mpsc::UnboundedReceiver<SwarmCommand>,
    discovered: mpsc::UnboundedSender<(PeerId, Vec<Multiaddr>)>,
    shutdown: watch::Receiver<bool>,
    routes: HashMap<TopicHash, Route>,
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<()>>>>,
    listen_addrs: Vec<Multiaddr>,
    network_key: kad::RecordKey,
}

impl SwarmTask {
    pub(crate) fn new(
        swarm: Swarm<OverlayBehaviour>,
        commands: mpsc::UnboundedReceiver<SwarmCommand>,
        discovered: mpsc::UnboundedSender<(PeerId, Vec<Multiaddr>)>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            swarm,
            commands,
            discovered,
            shutdown,
            routes: HashMap::new(),
            pending_dials: HashMap::new(),
            listen_addrs: Vec::new(),
            network_key: kad::RecordKey::new(&NETWORK_ID),
        }
    }

    pub(crate) async fn run(mut self) {
        let mut discovery = discovery_timer(Duration::from_secs(DISCOVERY_INTERVAL_SECS));

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                _ = discovery.tick() => self.advertise(),
            }
        }

        for (_, waiters) in self.pending_dials.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(MeshbookError::OverlayClosed));
            }
        }
        info!(peer = %self.swarm.local_peer_id(), "swarm task stopped");
    }

    /// Re-announce under the network id and look for others doing the same.
    fn advertise(&mut self) {
        let kademlia = &mut self.swarm.behaviour_mut().kademlia;
        if let Err(e) = kademlia.start_providing(self.network_key.clone()) {
            debug!(error = %e, "could not advertise network id");
        }
        kademlia.get_providers(self.network_key.clone());
    }

    fn handle_command(&mut self, command: SwarmCommand) {
        match command {
            SwarmCommand::Publish { topic, data } => {
                let len = data.len();
                match self.swarm.behaviour_mut().gossipsub.publish(topic.clone(), data) {
                    Ok(id) => debug!(topic = %topic, message = %id, bytes = len, "published"),
                    Err(gossipsub::PublishError::InsufficientPeers) => {
                        debug!(topic = %topic, "no peers on topic, message not sent");
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "publish failed"),
                }
            }
            SwarmCommand::Subscribe {
                topic,
                generation,
                route,
            } => {
                if let Err(e) = self.swarm.behaviour_mut().gossipsub.subscribe(&topic) {
                    warn!(topic = %topic, error = ?e, "gossip subscribe failed");
                    return;
                }
                debug!(topic = %topic, generation, "joined topic");
                self.routes.insert(
                    topic.hash(),
                    Route {
                        generation,
                        sender: route,
                    },
                );
            }
            SwarmCommand::Unsubscribe { topic, generation } => {
                let hash = topic.hash();
                if self
                    .routes
                    .get(&hash)
                    .is_some_and(|r| r.generation == generation)
                {
                    self.routes.remove(&hash);
                    if let Err(e) = self.swarm.behaviour_mut().gossipsub.unsubscribe(&topic) {
                        warn!(topic = %topic, error = ?e, "gossip unsubscribe failed");
                    }
                    debug!(topic = %topic, generation, "left topic");
                }
            }
            SwarmCommand::Dial { peer, addrs, reply } => self.dial(peer, addrs, reply),
            SwarmCommand::ListenViaRelay { relay } => {
                let circuit = relay.with(Protocol::P2pCircuit);
                match self.swarm.listen_on(circuit.clone()) {
                    Ok(_) => info!(addr = %circuit, "listening through relay"),
                    Err(e) => warn!(addr = %circuit, error = %e, "relay listen failed"),
                }
            }
            SwarmCommand::BootstrapDht => {
                if let Err(e) = self.swarm.behaviour_mut().kademlia.bootstrap() {
                    debug!(error = %e, "dht bootstrap skipped");
                }
                self.advertise();
            }
            SwarmCommand::ConnectedPeers { reply } => {
                let _ = reply.send(self.swarm.connected_peers().copied().collect());
            }
            SwarmCommand::TopicPeers { topic, reply } => {
                let peers = self
                    .swarm
                    .behaviour()
                    .gossipsub
                    .all_peers()
                    .filter(|(_, topics)| topics.contains(&&topic))
                    .map(|(peer, _)| *peer)
                    .collect();
                let _ = reply.send(peers);
            }
            SwarmCommand::ListenAddrs { reply } => {
                let _ = reply.send(self.listen_addrs.clone());
            }
        }
    }

    fn dial(
        &mut self,
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        reply: Option<oneshot::Sender<Result<()>>>,
    ) {
        for addr in &addrs {
            self.swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer, addr.clone());
        }
        let opts = DialOpts::peer_id(peer).addresses(addrs).build();
        match self.swarm.dial(opts) {
            Ok(()) => {
                debug!(peer = %peer, "dialing");
                if let Some(reply) = reply {
                    self.pending_dials.entry(peer).or_default().push(reply);
                }
            }
            Err(DialError::DialPeerConditionFalse(_)) => {
                // Already connected or a dial is in flight.
                if let Some(reply) = reply {
                    if self.swarm.is_connected(&peer) {
                        let _ = reply.send(Ok(()));
                    } else {
                        self.pending_dials.entry(peer).or_default().push(reply);
                    }
                }
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "dial rejected");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(MeshbookError::PeerConnectionFailed {
                        reason: format!("{peer}: {e}"),
                    }));
                }
            }
        }
    }

    fn resolve_dials(&mut self, peer: &PeerId, outcome: &Result<()>) {
        let Some(waiters) = self.pending_dials.remove(peer) else {
            return;
        };
        for waiter in waiters {
            let result = match outcome {
                Ok(()) => Ok(()),
                Err(e) => Err(MeshbookError::PeerConnectionFailed {
                    reason: e.to_string(),
                }),
            };
            let _ = waiter.send(result);
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<OverlayBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "listening");
                self.listen_addrs.push(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.listen_addrs.retain(|a| a != &address);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(peer = %peer_id, addr = %endpoint.get_remote_address(), "connected");
                self.resolve_dials(&peer_id, &Ok(()));
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(peer = %peer_id, "connection closed");
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(peer = %peer_id, error = %error, "outgoing connection failed");
                let outcome = Err(MeshbookError::PeerConnectionFailed {
                    reason: format!("{peer_id}: {error}"),
                });
                self.resolve_dials(&peer_id, &outcome);
            }
            SwarmEvent::ListenerError { error, .. } => {
                warn!(error = %error, "listener error");
            }
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),
            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: OverlayBehaviourEvent) {
        match event {
            OverlayBehaviourEvent::Gossipsub(event) => self.handle_gossip_event(event),
            OverlayBehaviourEvent::Kademlia(event) => self.handle_kad_event(event),
            OverlayBehaviourEvent::Identify(event) => {
                if let identify::Event::Received { peer_id, info, .. } = event {
                    debug!(peer = %peer_id, agent = %info.agent_version, "identified");
                    for addr in info.listen_addrs {
                        self.swarm
                            .behaviour_mut()
                            .kademlia
                            .add_address(&peer_id, addr);
                    }
                }
            }
            OverlayBehaviourEvent::Ping(_) => {}
            OverlayBehaviourEvent::RelayClient(event) => match event {
                relay::client::Event::ReservationReqAccepted { relay_peer_id, .. } => {
                    info!(relay = %relay_peer_id, "relay reservation accepted");
                }
                other => debug!(event = ?other, "relay client event"),
            },
            OverlayBehaviourEvent::Upnp(event) => match event {
                upnp::Event::NewExternalAddr(addr) => info!(addr = %addr, "gateway port mapped"),
                upnp::Event::GatewayNotFound => warn!("no UPnP gateway found"),
                upnp::Event::NonRoutableGateway => warn!("UPnP gateway is not routable"),
                other => debug!(event = ?other, "upnp event"),
            },
        }
    }

    fn handle_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message { message, .. } => {
                let Some(route) = self.routes.get(&message.topic) else {
                    debug!(topic = %message.topic, "message for topic without reader");
                    return;
                };
                let inbound = Inbound {
                    source: message.source,
                    data: message.data,
                };
                if route.sender.send(inbound).is_err() {
                    debug!(topic = %message.topic, "reader gone, message dropped");
                }
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                debug!(peer = %peer_id, topic = %topic, "peer joined topic");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                debug!(peer = %peer_id, topic = %topic, "peer left topic");
            }
            _ => {}
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                let _ = self.discovered.send((peer, addresses.into_vec()));
            }
            kad::Event::OutboundQueryProgressed { result, .. } => match result {
                kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders {
                    providers,
                    ..
                })) => {
                    debug!(count = providers.len(), "found network providers");
                    for peer in providers {
                        let _ = self.discovered.send((peer, Vec::new()));
                    }
                }
                kad::QueryResult::StartProviding(Err(e)) => {
                    debug!(error = %e, "advertisement failed");
                }
                kad::QueryResult::Bootstrap(Ok(ok)) => {
                    debug!(remaining = ok.num_remaining, "dht bootstrap progressed");
                }
                kad::QueryResult::Bootstrap(Err(e)) => debug!(error = %e, "dht bootstrap failed"),
                _ => {}
            },
            _ => {}
        }
    }
}

/// Periodic re-advertisement. The first round runs on `BootstrapDht`, once
/// seeds have been dialed, so the timer's first tick is one full period out.
fn discovery_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer
}
