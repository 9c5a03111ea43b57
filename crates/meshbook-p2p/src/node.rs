//! The overlay host.
//!
//! [`OverlayNode::run`] builds the libp2p host and starts the background
//! tasks:
//!
//! ```text
//!  send() ──► outbound queue ──► drain task ──┐
//!                                             ▼
//!  subscribe() ─────────────────────────► swarm task ◄── connector task
//!                                             │              ▲
//!                      routed gossip ◄────────┘   discovered peers
//!                           │
//!                     channel reader ──► Receiver::receive
//! ```
//!
//! The swarm task is the only owner of the `Swarm`; everything else reaches
//! it through commands. Every task watches the root shutdown signal.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use libp2p::gossipsub::IdentTopic;
use libp2p::{Multiaddr, PeerId, SwarmBuilder, identity, noise, tcp, yamux};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use meshbook_types::constants::{
    BOOTSTRAP_CONCURRENCY, BOOTSTRAP_DIAL_TIMEOUT_SECS, IDLE_CONNECTION_TIMEOUT_SECS,
    SHUTDOWN_GRACE_MS,
};
use meshbook_types::{Channel, ChannelId, MeshbookError, P2pConfig, Result, WireMessage};

use crate::addrs;
use crate::behaviour::OverlayBehaviour;
use crate::overlay::{Overlay, Receiver};
use crate::subscription::SubscriptionTable;
use crate::swarm_task::{Inbound, SwarmCommand, SwarmTask};

type ReceiverSlot = Arc<RwLock<Option<Arc<dyn Receiver>>>>;

/// Receivers parked until the first `run`.
struct Pending {
    commands: mpsc::UnboundedReceiver<SwarmCommand>,
    outbound: mpsc::UnboundedReceiver<WireMessage>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    runtime: tokio::runtime::Handle,
    tasks: Vec<JoinHandle<()>>,
}

enum Lifecycle {
    Idle(Box<Pending>),
    Starting,
    Running(Running),
    Closed,
}

/// A meshbook overlay host: libp2p swarm, DHT discovery, and gossip channels.
pub struct OverlayNode {
    config: P2pConfig,
    keypair: identity::Keypair,
    peer_id: PeerId,
    commands: mpsc::UnboundedSender<SwarmCommand>,
    outbound: mpsc::UnboundedSender<WireMessage>,
    receiver: ReceiverSlot,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    active_readers: Arc<AtomicUsize>,
    lifecycle: Mutex<Lifecycle>,
}

impl OverlayNode {
    pub fn new(config: P2pConfig, keypair: identity::Keypair) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let peer_id = keypair.public().to_peer_id();
        Self {
            config,
            keypair,
            peer_id,
            commands,
            outbound,
            receiver: Arc::new(RwLock::new(None)),
            subscriptions: Arc::new(Mutex::new(SubscriptionTable::default())),
            active_readers: Arc::new(AtomicUsize::new(0)),
            lifecycle: Mutex::new(Lifecycle::Idle(Box::new(Pending {
                commands: commands_rx,
                outbound: outbound_rx,
            }))),
        }
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Start the host and its background tasks.
    ///
    /// Returns once the host listens and the seed peers have been tried.
    /// Calling it on a running node does nothing.
    ///
    /// # Errors
    /// `HostCreation` if the transport cannot be built or the listen address
    /// cannot be bound; `OverlayClosed` if the node was closed.
    pub async fn run(&self) -> Result<()> {
        let pending = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Starting) {
                Lifecycle::Idle(pending) => pending,
                Lifecycle::Closed => {
                    *lifecycle = Lifecycle::Closed;
                    return Err(MeshbookError::OverlayClosed);
                }
                other => {
                    *lifecycle = other;
                    return Ok(());
                }
            }
        };

        let swarm = match self.build_swarm() {
            Ok(swarm) => swarm,
            Err(e) => {
                error!(error = %e, "host creation failed");
                let mut lifecycle = self.lifecycle.lock();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Idle(pending);
                }
                return Err(e);
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (discovered_tx, discovered_rx) = mpsc::unbounded_channel();
        let Pending { commands, outbound } = *pending;

        let swarm_task = SwarmTask::new(swarm, commands, discovered_tx, shutdown_rx.clone());
        let tasks = vec![
            tokio::spawn(swarm_task.run()),
            tokio::spawn(drain_outbound(
                outbound,
                self.commands.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(connect_discovered(
                discovered_rx,
                self.commands.clone(),
                self.peer_id,
                shutdown_rx,
            )),
        ];

        let running = Running {
            shutdown,
            runtime: tokio::runtime::Handle::current(),
            tasks,
        };
        if let Some(orphaned) = self.install(running) {
            warn!(peer = %self.peer_id, "closed while starting, stopping background tasks");
            stop_tasks(orphaned).await;
            return Err(MeshbookError::OverlayClosed);
        }
        info!(peer = %self.peer_id, "overlay host started");

        self.bootstrap().await;
        Ok(())
    }

    /// Publish `running` unless `close` ran while the host was starting, in
    /// which case it is handed back to be stopped.
    fn install(&self, running: Running) -> Option<Running> {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, Lifecycle::Closed) {
            return Some(running);
        }
        *lifecycle = Lifecycle::Running(running);
        None
    }

    fn build_swarm(&self) -> Result<libp2p::Swarm<OverlayBehaviour>> {
        let enable_relay = self.config.enable_relay;
        let enable_upnp = addrs::uses_nat_port_map(&self.config);

        let mut swarm = SwarmBuilder::with_existing_identity(self.keypair.clone())
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(host_err)?
            .with_dns()
            .map_err(host_err)?
            .with_relay_client(noise::Config::new, yamux::Config::default)
            .map_err(host_err)?
            .with_behaviour(|key, relay_client| {
                OverlayBehaviour::new(key, enable_relay.then_some(relay_client), enable_upnp)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(host_err)?
            .with_swarm_config(|c| {
                c.with_idle_connection_timeout(Duration::from_secs(IDLE_CONNECTION_TIMEOUT_SECS))
            })
            .build();

        let listen = addrs::listen_addr(&self.config);
        swarm
            .listen_on(listen.clone())
            .map_err(|e| {
                MeshbookError::HostCreation(format!("listen on {listen}: {}", error_chain(&e)))
            })?;
        if self.config.external_ip.is_some() && self.config.port != 0 {
            swarm.add_external_address(listen);
        }
        Ok(swarm)
    }

    /// Dial the seed peers concurrently, then start the DHT bootstrap query.
    async fn bootstrap(&self) {
        let seeds: Vec<(PeerId, Multiaddr)> = self
            .config
            .bootstrap_peers
            .iter()
            .filter_map(|seed| match addrs::parse_seed(seed) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(error = %e, "skipping seed peer");
                    None
                }
            })
            .filter(|(peer, _)| *peer != self.peer_id)
            .collect();

        if !seeds.is_empty() {
            let total = seeds.len();
            let auto_relay = self.config.enable_relay && self.config.enable_auto_relay;
            let commands = &self.commands;
            let connected = futures::stream::iter(seeds)
                .map(|(peer, addr)| async move {
                    match dial_seed(commands, peer, addr.clone()).await {
                        Ok(()) => {
                            debug!(peer = %peer, "seed peer connected");
                            if auto_relay {
                                let _ = commands.send(SwarmCommand::ListenViaRelay { relay: addr });
                            }
                            true
                        }
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "seed peer unreachable");
                            false
                        }
                    }
                })
                .buffer_unordered(BOOTSTRAP_CONCURRENCY)
                .filter(|ok| futures::future::ready(*ok))
                .count()
                .await;
            info!(connected, total, "bootstrap finished");
        }

        let _ = self.commands.send(SwarmCommand::BootstrapDht);
    }

    /// Stop every background task and drop the host.
    ///
    /// Tasks get a bounded grace period; stragglers are aborted. The
    /// registered receiver is released. Closing twice is harmless.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Closed);
        let Lifecycle::Running(running) = previous else {
            return;
        };

        stop_tasks(running).await;
        self.receiver.write().take();
        info!(peer = %self.peer_id, "overlay host closed");
    }

    /// Peers with an open connection.
    pub async fn connected_peers(&self) -> Result<Vec<PeerId>> {
        self.query(|reply| SwarmCommand::ConnectedPeers { reply }).await
    }

    /// Peers known to be subscribed to `channel`'s topic.
    pub async fn topic_peers(&self, channel: &ChannelId) -> Result<Vec<PeerId>> {
        let topic = IdentTopic::new(channel.topic()).hash();
        self.query(|reply| SwarmCommand::TopicPeers { topic, reply }).await
    }

    /// Addresses the host is listening on.
    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>> {
        self.query(|reply| SwarmCommand::ListenAddrs { reply }).await
    }

    /// Number of channels with an active subscription.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().active()
    }

    /// Number of channel reader tasks alive.
    pub fn active_readers(&self) -> usize {
        self.active_readers.load(Ordering::SeqCst)
    }

    async fn query<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SwarmCommand,
    ) -> Result<T> {
        if !matches!(*self.lifecycle.lock(), Lifecycle::Running(_)) {
            return Err(MeshbookError::OverlayClosed);
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| MeshbookError::OverlayClosed)?;
        rx.await.map_err(|_| MeshbookError::OverlayClosed)
    }
}

impl Overlay for OverlayNode {
    fn host_id(&self) -> String {
        self.peer_id.to_string()
    }

    fn add_receiver(&self, receiver: Arc<dyn Receiver>) {
        *self.receiver.write() = Some(receiver);
    }

    fn send(&self, message: WireMessage) {
        let channel = message.channel_id.clone();
        if self.outbound.send(message).is_err() {
            warn!(channel = %channel, "overlay closed, message dropped");
        }
    }

    fn subscribe(&self, channel: &Channel) -> Result<()> {
        let (shutdown, runtime) = match &*self.lifecycle.lock() {
            Lifecycle::Running(running) => (running.shutdown.subscribe(), running.runtime.clone()),
            _ => return Err(MeshbookError::OverlayClosed),
        };

        let mut table = self.subscriptions.lock();
        if table.is_active(&channel.id) {
            debug!(channel = %channel.id, "already subscribed");
            return Ok(());
        }

        let topic = IdentTopic::new(channel.id.topic());
        let (generation, quit) = table.open(channel.id.clone());
        let (route, routed) = mpsc::unbounded_channel();
        if self
            .commands
            .send(SwarmCommand::Subscribe {
                topic: topic.clone(),
                generation,
                route,
            })
            .is_err()
        {
            table.remove_if_current(&channel.id, generation);
            return Err(MeshbookError::OverlayClosed);
        }

        let reader = ChannelReader {
            channel: channel.id.clone(),
            topic,
            generation,
            host: self.peer_id,
            receiver: self.receiver.clone(),
            subscriptions: self.subscriptions.clone(),
            commands: self.commands.clone(),
            active: self.active_readers.clone(),
        };
        self.active_readers.fetch_add(1, Ordering::SeqCst);
        let handle = runtime.spawn(reader.run(quit, shutdown, routed));
        drop(table);

        if let Lifecycle::Running(running) = &mut *self.lifecycle.lock() {
            running.tasks.retain(|t| !t.is_finished());
            running.tasks.push(handle);
        }
        info!(channel = %channel.id, generation, "subscribed");
        Ok(())
    }

    fn unsubscribe(&self, channel: &Channel) -> Result<()> {
        if let Err(e) = self.subscriptions.lock().cancel(&channel.id) {
            warn!(channel = %channel.id, "unsubscribe without an active subscription");
            return Err(e);
        }
        info!(channel = %channel.id, "unsubscribed");
        Ok(())
    }
}

/// Trip the shutdown signal and wait out the grace period; stragglers are
/// aborted.
async fn stop_tasks(running: Running) {
    let _ = running.shutdown.send(true);
    let aborts: Vec<_> = running.tasks.iter().map(JoinHandle::abort_handle).collect();
    let grace = Duration::from_millis(SHUTDOWN_GRACE_MS);
    if tokio::time::timeout(grace, futures::future::join_all(running.tasks))
        .await
        .is_err()
    {
        warn!("background tasks did not stop in time, aborting");
        for abort in aborts {
            abort.abort();
        }
    }
}

/// `err` and its sources, skipping empty messages.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        if !text.is_empty() {
            parts.push(text);
        }
        current = e.source();
    }
    if parts.is_empty() {
        format!("{err:?}")
    } else {
        parts.join(": ")
    }
}

fn host_err(err: impl std::fmt::Display) -> MeshbookError {
    MeshbookError::HostCreation(err.to_string())
}

async fn dial_seed(
    commands: &mpsc::UnboundedSender<SwarmCommand>,
    peer: PeerId,
    addr: Multiaddr,
) -> Result<()> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(SwarmCommand::Dial {
            peer,
            addrs: vec![addr],
            reply: Some(reply),
        })
        .map_err(|_| MeshbookError::OverlayClosed)?;
    match tokio::time::timeout(Duration::from_secs(BOOTSTRAP_DIAL_TIMEOUT_SECS), rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(MeshbookError::OverlayClosed),
        Err(_) => Err(MeshbookError::PeerConnectionFailed {
            reason: format!("{peer}: timed out"),
        }),
    }
}

/// Forward queued outbound messages to the swarm in FIFO order.
async fn drain_outbound(
    mut outbound: mpsc::UnboundedReceiver<WireMessage>,
    commands: mpsc::UnboundedSender<SwarmCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            next = outbound.recv() => {
                let Some(message) = next else { break };
                let topic = IdentTopic::new(message.channel_id.topic());
                debug!(
                    channel = %message.channel_id,
                    operation = %message.operation,
                    "broadcasting"
                );
                let publish = SwarmCommand::Publish {
                    topic,
                    data: message.encode(),
                };
                if commands.send(publish).is_err() {
                    break;
                }
            }
        }
    }
    debug!("outbound drain stopped");
}

/// Connect to each newly discovered peer once.
async fn connect_discovered(
    mut discovered: mpsc::UnboundedReceiver<(PeerId, Vec<Multiaddr>)>,
    commands: mpsc::UnboundedSender<SwarmCommand>,
    local: PeerId,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut seen = HashSet::new();
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            next = discovered.recv() => {
                let Some((peer, addrs)) = next else { break };
                if peer == local || !seen.insert(peer) {
                    continue;
                }
                debug!(peer = %peer, "connecting to discovered peer");
                let dial = SwarmCommand::Dial {
                    peer,
                    addrs,
                    reply: None,
                };
                if commands.send(dial).is_err() {
                    break;
                }
            }
        }
    }
    debug!(peers = seen.len(), "peer connector stopped");
}

/// The single reader task of one channel subscription.
struct ChannelReader {
    channel: ChannelId,
    topic: IdentTopic,
    generation: u64,
    host: PeerId,
    receiver: ReceiverSlot,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    commands: mpsc::UnboundedSender<SwarmCommand>,
    active: Arc<AtomicUsize>,
}

impl ChannelReader {
    async fn run(
        self,
        mut quit: oneshot::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
        mut routed: mpsc::UnboundedReceiver<Inbound>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut quit => break,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = routed.recv() => match next {
                    Some(inbound) => self.deliver(inbound).await,
                    None => break,
                },
            }
        }

        self.subscriptions
            .lock()
            .remove_if_current(&self.channel, self.generation);
        let _ = self.commands.send(SwarmCommand::Unsubscribe {
            topic: self.topic.clone(),
            generation: self.generation,
        });
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!(channel = %self.channel, generation = self.generation, "channel reader stopped");
    }

    /// Hand one message to the receiver on the blocking pool. Messages of a
    /// channel are still delivered one at a time, in arrival order.
    async fn deliver(&self, inbound: Inbound) {
        if inbound.source == Some(self.host) {
            return;
        }
        let Some(receiver) = self.receiver.read().clone() else {
            debug!(channel = %self.channel, "no receiver registered, message dropped");
            return;
        };
        let outcome = tokio::task::spawn_blocking(move || receiver.receive(&inbound.data)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(channel = %self.channel, error = %e, "receiver rejected message"),
            Err(e) if e.is_panic() => error!(channel = %self.channel, "receiver panicked"),
            Err(e) => debug!(channel = %self.channel, error = %e, "delivery cancelled"),
        }
    }
}
