//! Relay integration tests
//!
//! Wires two broker-side sessions (one dial leg, one listen leg)
//! through an in-memory bus and drives them from simulated client and
//! agent peers over the in-memory duplex transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use uuid::Uuid;

use tether_broker::{relay_dial, relay_listen, RelayError, RelayOptions};
use tether_bus::{MemoryBus, Pubsub};
use tether_session::memory::pair;
use tether_session::{Session, SessionRole};

/// One broker leg: a server-role session paired with the peer's
/// client-role session.
async fn broker_leg() -> (Arc<Session>, Session) {
    let (broker_side, peer_side) = pair();

    let (broker, peer) = tokio::join!(
        Session::establish(broker_side.0, broker_side.1, SessionRole::Server),
        Session::establish(peer_side.0, peer_side.1, SessionRole::Client),
    );

    (Arc::new(broker.expect("broker session")), peer.expect("peer session"))
}

fn spawn_listen(
    session: Arc<Session>,
    bus: Arc<dyn Pubsub>,
    opts: RelayOptions,
) -> JoinHandle<Result<(), RelayError>> {
    tokio::spawn(async move { relay_listen(&session, bus, opts).await })
}

fn spawn_dial(
    session: Arc<Session>,
    bus: Arc<dyn Pubsub>,
    opts: RelayOptions,
) -> JoinHandle<Result<(), RelayError>> {
    tokio::spawn(async move { relay_dial(&session, bus, opts).await })
}

/// Full fixture: listen relay running for `agent_id`, dial relay
/// running on a second leg, both over the same bus.
struct Relayed {
    peer_client: Session,
    peer_agent: Session,
    dial_handle: JoinHandle<Result<(), RelayError>>,
    listen_handle: JoinHandle<Result<(), RelayError>>,
}

async fn start_relayed(bus: Arc<dyn Pubsub>, agent_id: Uuid) -> Relayed {
    let (broker_agent, peer_agent) = broker_leg().await;
    let listen_handle = spawn_listen(broker_agent, bus.clone(), RelayOptions::new(agent_id));
    // Let the listen relay register on the dial channel first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (broker_client, peer_client) = broker_leg().await;
    let dial_handle = spawn_dial(broker_client, bus, RelayOptions::new(agent_id));

    Relayed {
        peer_client,
        peer_agent,
        dial_handle,
        listen_handle,
    }
}

#[tokio::test]
async fn test_dial_round_trip() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());
    let relayed = start_relayed(bus, Uuid::new_v4()).await;

    let mut outbound = relayed.peer_client.open_stream().expect("open");
    outbound.send(b"sdp offer").await.expect("send offer");

    let mut inbound = relayed.peer_agent.accept_stream().await.expect("accept");
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"sdp offer")));

    inbound.send(b"sdp answer").await.expect("send answer");
    assert_eq!(outbound.recv().await, Some(Bytes::from_static(b"sdp answer")));
}

#[tokio::test]
async fn test_empty_message_relayed_intact() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());
    let relayed = start_relayed(bus, Uuid::new_v4()).await;

    let mut outbound = relayed.peer_client.open_stream().expect("open");
    outbound.send(b"first").await.expect("send");
    outbound.send(b"").await.expect("send empty");
    outbound.send(b"third").await.expect("send");

    // A zero-length message crosses both sessions and the bus without
    // ending the exchange.
    let mut inbound = relayed.peer_agent.accept_stream().await.expect("accept");
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"first")));
    assert_eq!(inbound.recv().await, Some(Bytes::new()));
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"third")));

    inbound.send(b"still open").await.expect("reply");
    assert_eq!(outbound.recv().await, Some(Bytes::from_static(b"still open")));
}

#[tokio::test]
async fn test_finish_propagates_to_dialer() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());
    let relayed = start_relayed(bus, Uuid::new_v4()).await;

    let mut outbound = relayed.peer_client.open_stream().expect("open");
    outbound.send(b"offer").await.expect("send");

    let mut inbound = relayed.peer_agent.accept_stream().await.expect("accept");
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"offer")));

    inbound.finish().await;
    assert_eq!(outbound.recv().await, None);
}

#[tokio::test]
async fn test_order_preserved_across_relay() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());
    let relayed = start_relayed(bus, Uuid::new_v4()).await;

    let mut outbound = relayed.peer_client.open_stream().expect("open");
    outbound.send(b"start").await.expect("send");

    let mut inbound = relayed.peer_agent.accept_stream().await.expect("accept");
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"start")));

    for i in 0..50u32 {
        outbound.send(&i.to_be_bytes()).await.expect("send");
    }
    for i in 0..50u32 {
        let got = inbound.recv().await.expect("recv");
        assert_eq!(got.as_ref(), i.to_be_bytes());
    }
}

#[tokio::test]
async fn test_dial_without_listener_is_bounded() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());

    let (broker_client, peer_client) = broker_leg().await;
    let opts = RelayOptions::new(Uuid::new_v4())
        .with_accept_timeout(Duration::from_millis(100));
    let dial_handle = spawn_dial(broker_client, bus, opts);

    let mut outbound = peer_client.open_stream().expect("open");
    outbound.send(b"offer").await.expect("send");

    // No listener anywhere: the relay must fail within the bound, not
    // hang.
    let result = tokio::time::timeout(Duration::from_secs(5), dial_handle)
        .await
        .expect("relay did not terminate")
        .expect("relay task panicked");
    assert!(matches!(result, Err(RelayError::NoListener)));

    // The whole session is torn down with it.
    assert_eq!(outbound.recv().await, None);
}

#[tokio::test]
async fn test_concurrent_dials_no_cross_talk() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());
    let relayed = start_relayed(bus, Uuid::new_v4()).await;
    let peer_agent = Arc::new(relayed.peer_agent);

    // Agent side echoes whatever arrives on each accepted stream.
    let echo_agent = peer_agent.clone();
    tokio::spawn(async move {
        while let Some(mut stream) = echo_agent.accept_stream().await {
            tokio::spawn(async move {
                while let Some(body) = stream.recv().await {
                    if stream.send(&body).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    let mut tasks = Vec::new();
    let client = Arc::new(relayed.peer_client);
    for i in 0..10u32 {
        let mut stream = client.open_stream().expect("open");
        tasks.push(tokio::spawn(async move {
            let tag = format!("exchange-{i}");
            stream.send(tag.as_bytes()).await.expect("send");
            let echoed = stream.recv().await.expect("recv");
            assert_eq!(echoed.as_ref(), tag.as_bytes());
        }));
    }
    for task in tasks {
        task.await.expect("exchange task");
    }
}

#[tokio::test]
async fn test_newer_listener_supersedes_older() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());
    let agent_id = Uuid::new_v4();

    let (broker_a, peer_a) = broker_leg().await;
    let handle_a = spawn_listen(broker_a, bus.clone(), RelayOptions::new(agent_id));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (broker_b, _peer_b) = broker_leg().await;
    let _handle_b = spawn_listen(broker_b, bus, RelayOptions::new(agent_id));

    let result = tokio::time::timeout(Duration::from_secs(5), handle_a)
        .await
        .expect("older listener did not stand down")
        .expect("listen task panicked");
    assert!(matches!(result, Err(RelayError::Superseded)));

    // The superseded agent connection is closed out from under it.
    assert!(peer_a.accept_stream().await.is_none());
}

#[tokio::test]
async fn test_listen_ends_cleanly_when_agent_disconnects() {
    let bus: Arc<dyn Pubsub> = Arc::new(MemoryBus::new());

    let (broker_agent, peer_agent) = broker_leg().await;
    let handle = spawn_listen(broker_agent, bus, RelayOptions::new(Uuid::new_v4()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    peer_agent.close();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("listen relay did not stop")
        .expect("listen task panicked");
    assert!(result.is_ok());
}
