//! Overlay host tests on loopback.
//!
//! Each test runs real libp2p hosts bound to 127.0.0.1 on ephemeral ports,
//! with no seeds, relay, or NAT mapping unless the test wires two hosts
//! together.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use libp2p::PeerId;
use libp2p::identity::Keypair;
use parking_lot::Mutex;

use meshbook_p2p::{Overlay, OverlayNode, Receiver};
use meshbook_types::{
    AssetPair, Channel, MeshbookError, Operation, Order, P2pConfig, Result, WireMessage,
};

#[derive(Default)]
struct Collector {
    seen: Mutex<Vec<Vec<u8>>>,
}

impl Receiver for Collector {
    fn receive(&self, buf: &[u8]) -> Result<()> {
        self.seen.lock().push(buf.to_vec());
        Ok(())
    }
}

struct Panicker;

/// Blocks inside `receive` until released or five seconds pass.
struct Gate {
    entered: std::sync::atomic::AtomicBool,
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl Receiver for Gate {
    fn receive(&self, _buf: &[u8]) -> Result<()> {
        self.entered.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
        Ok(())
    }
}

impl Receiver for Panicker {
    fn receive(&self, _buf: &[u8]) -> Result<()> {
        panic!("receiver blew up");
    }
}

fn btc_usd() -> Channel {
    Channel::for_pair(&AssetPair::new("BTC", "USD")).unwrap()
}

async fn started(config: P2pConfig) -> OverlayNode {
    let node = OverlayNode::new(config, Keypair::generate_ed25519());
    node.run().await.unwrap();
    node
}

/// Poll `check` every 50ms until it holds or `secs` elapse.
async fn eventually<F, Fut>(secs: u64, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Two hosts where `b` used `a` as its seed, both on `channel`, each seeing
/// the other on the topic.
async fn connected_pair(channel: &Channel) -> (OverlayNode, OverlayNode) {
    let a = started(P2pConfig::local()).await;
    assert!(eventually(5, || async { !a.listen_addrs().await.unwrap().is_empty() }).await);
    let addr = a.listen_addrs().await.unwrap()[0].clone();

    let mut config = P2pConfig::local();
    config.bootstrap_peers = vec![format!("{addr}/p2p/{}", a.peer_id())];
    let b = started(config).await;

    a.subscribe(channel).unwrap();
    b.subscribe(channel).unwrap();
    assert!(
        eventually(10, || async {
            !a.topic_peers(&channel.id).await.unwrap().is_empty()
                && !b.topic_peers(&channel.id).await.unwrap().is_empty()
        })
        .await,
        "hosts never saw each other on the topic"
    );
    (a, b)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_is_idempotent() {
    let node = started(P2pConfig::local()).await;
    node.run().await.unwrap();
    assert!(!node.host_id().is_empty());
    assert_eq!(node.host_id(), node.peer_id().to_string());
    node.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_after_close_fails() {
    let node = started(P2pConfig::local()).await;
    node.close().await;
    node.close().await;
    assert!(matches!(node.run().await, Err(MeshbookError::OverlayClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_tolerates_bad_and_unreachable_seeds() {
    let mut config = P2pConfig::local();
    config.bootstrap_peers = vec![
        format!("/ip4/127.0.0.1/tcp/1/p2p/{}", PeerId::random()),
        "not a multiaddr".to_string(),
        "/ip4/127.0.0.1/tcp/4001".to_string(),
    ];
    let node = OverlayNode::new(config, Keypair::generate_ed25519());
    node.run().await.unwrap();
    assert!(node.connected_peers().await.unwrap().is_empty());
    node.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_on_a_busy_port_is_fatal() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = P2pConfig::local();
    config.port = taken.local_addr().unwrap().port();

    let node = OverlayNode::new(config, Keypair::generate_ed25519());
    let err = node.run().await.unwrap_err();
    assert!(matches!(err, MeshbookError::HostCreation(_)), "got {err}");
    assert!(!err.to_string().ends_with(": "), "no cause in {err}");
    assert!(matches!(
        node.subscribe(&btc_usd()),
        Err(MeshbookError::OverlayClosed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribe_before_run_is_rejected() {
    let node = OverlayNode::new(P2pConfig::local(), Keypair::generate_ed25519());
    let err = node.subscribe(&btc_usd()).unwrap_err();
    assert!(matches!(err, MeshbookError::OverlayClosed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resubscribe_leaves_exactly_one_reader() {
    let node = started(P2pConfig::local()).await;
    let channel = btc_usd();

    node.subscribe(&channel).unwrap();
    node.subscribe(&channel).unwrap();
    assert_eq!(node.active_readers(), 1);

    node.unsubscribe(&channel).unwrap();
    node.subscribe(&channel).unwrap();

    assert!(
        eventually(5, || async {
            node.active_readers() == 1 && node.active_subscriptions() == 1
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(node.active_readers(), 1);
    assert_eq!(node.active_subscriptions(), 1);

    node.close().await;
    assert_eq!(node.active_readers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsubscribe_without_subscription_is_an_error() {
    let node = started(P2pConfig::local()).await;
    let channel = btc_usd();

    let err = node.unsubscribe(&channel).unwrap_err();
    assert!(matches!(err, MeshbookError::NotSubscribed(_)));

    node.subscribe(&channel).unwrap();
    node.unsubscribe(&channel).unwrap();
    assert!(matches!(
        node.unsubscribe(&channel),
        Err(MeshbookError::NotSubscribed(_))
    ));
    assert!(eventually(5, || async { node.active_readers() == 0 }).await);
    node.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn messages_reach_the_other_host_only_while_subscribed() {
    let channel = btc_usd();
    let (a, b) = connected_pair(&channel).await;
    let from_a = Arc::new(Collector::default());
    let from_b = Arc::new(Collector::default());
    a.add_receiver(from_b.clone());
    b.add_receiver(from_a.clone());

    let order = Order::dummy("BTC", "USD", 5, 35_000.0);
    let message = WireMessage::for_order(channel.id.clone(), Operation::Create, &order);
    a.send(message.clone());

    assert!(eventually(10, || async { from_a.seen.lock().len() == 1 }).await);
    assert_eq!(from_a.seen.lock()[0], message.encode());
    // The sender does not hear its own broadcast.
    assert!(from_b.seen.lock().is_empty());

    b.unsubscribe(&channel).unwrap();
    assert!(eventually(5, || async { b.active_readers() == 0 }).await);
    a.send(message);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(from_a.seen.lock().len(), 1);

    a.close().await;
    b.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_receiver_does_not_stop_the_reader() {
    let channel = btc_usd();
    let (a, b) = connected_pair(&channel).await;
    b.add_receiver(Arc::new(Panicker));

    let order = Order::dummy("BTC", "USD", 1, 1.0);
    a.send(WireMessage::for_order(channel.id.clone(), Operation::Create, &order));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(b.active_readers(), 1);

    let collector = Arc::new(Collector::default());
    b.add_receiver(collector.clone());
    a.send(WireMessage::for_order(channel.id.clone(), Operation::Delete, &order));
    assert!(eventually(10, || async { !collector.seen.lock().is_empty() }).await);

    a.close().await;
    b.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn slow_receiver_does_not_stall_the_host() {
    let channel = btc_usd();
    let (a, b) = connected_pair(&channel).await;
    let (release, gate_rx) = std::sync::mpsc::channel();
    let gate = Arc::new(Gate {
        entered: std::sync::atomic::AtomicBool::new(false),
        release: Mutex::new(gate_rx),
    });
    b.add_receiver(gate.clone());

    let order = Order::dummy("BTC", "USD", 1, 1.0);
    a.send(WireMessage::for_order(channel.id.clone(), Operation::Create, &order));
    assert!(
        eventually(10, || async {
            gate.entered.load(std::sync::atomic::Ordering::SeqCst)
        })
        .await
    );

    // The receiver is still blocked; the host keeps answering.
    let started = std::time::Instant::now();
    b.listen_addrs().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    release.send(()).unwrap();
    a.close().await;
    b.close().await;
}
