//! Session adapter integration tests over the in-memory duplex pair

use bytes::Bytes;
use tether_session::memory::pair;
use tether_session::{FrameSink, Session, SessionError, SessionRole};

async fn establish_pair() -> (Session, Session) {
    let (server_side, client_side) = pair();

    let (server, client) = tokio::join!(
        Session::establish(server_side.0, server_side.1, SessionRole::Server),
        Session::establish(client_side.0, client_side.1, SessionRole::Client),
    );

    (server.expect("server session"), client.expect("client session"))
}

#[tokio::test]
async fn test_open_and_accept_stream() {
    let (server, client) = establish_pair().await;

    let mut outbound = client.open_stream().expect("open");
    outbound.send(b"hello broker").await.expect("send");

    let mut inbound = server.accept_stream().await.expect("accept");
    assert_eq!(inbound.id(), outbound.id());
    assert_eq!(
        inbound.recv().await,
        Some(Bytes::from_static(b"hello broker"))
    );
}

#[tokio::test]
async fn test_order_preserved_within_stream() {
    let (server, client) = establish_pair().await;

    let mut outbound = client.open_stream().expect("open");
    for i in 0..100u32 {
        outbound.send(&i.to_be_bytes()).await.expect("send");
    }

    let mut inbound = server.accept_stream().await.expect("accept");
    for i in 0..100u32 {
        let payload = inbound.recv().await.expect("payload");
        assert_eq!(payload.as_ref(), i.to_be_bytes());
    }
}

#[tokio::test]
async fn test_streams_are_independent() {
    let (server, client) = establish_pair().await;

    let mut first = client.open_stream().expect("open first");
    let mut second = client.open_stream().expect("open second");
    assert_ne!(first.id(), second.id());

    first.send(b"on-first").await.unwrap();
    second.send(b"on-second").await.unwrap();

    let mut accepted_first = server.accept_stream().await.expect("accept first");
    let mut accepted_second = server.accept_stream().await.expect("accept second");

    assert_eq!(
        accepted_first.recv().await,
        Some(Bytes::from_static(b"on-first"))
    );
    assert_eq!(
        accepted_second.recv().await,
        Some(Bytes::from_static(b"on-second"))
    );
}

#[tokio::test]
async fn test_both_directions() {
    let (server, client) = establish_pair().await;

    // Server-opened streams use even IDs, client-opened odd ones; the
    // two directions never collide.
    let mut from_server = server.open_stream().expect("server open");
    from_server.send(b"from server").await.unwrap();

    let mut from_client = client.open_stream().expect("client open");
    from_client.send(b"from client").await.unwrap();

    assert_ne!(from_server.id() % 2, from_client.id() % 2);

    let mut at_client = client.accept_stream().await.expect("client accept");
    assert_eq!(at_client.recv().await, Some(Bytes::from_static(b"from server")));

    let mut at_server = server.accept_stream().await.expect("server accept");
    assert_eq!(at_server.recv().await, Some(Bytes::from_static(b"from client")));
}

#[tokio::test]
async fn test_empty_payload_is_not_end_of_stream() {
    let (server, client) = establish_pair().await;

    // Payloads are opaque; a zero-length one must arrive like any
    // other, only an explicit finish ends the stream.
    let mut outbound = client.open_stream().expect("open");
    outbound.send(b"first").await.unwrap();
    outbound.send(b"").await.unwrap();
    outbound.send(b"third").await.unwrap();

    let mut inbound = server.accept_stream().await.expect("accept");
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"first")));
    assert_eq!(inbound.recv().await, Some(Bytes::new()));
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"third")));
    assert!(!inbound.is_closed());

    outbound.finish().await;
    assert_eq!(inbound.recv().await, None);
}

#[tokio::test]
async fn test_finish_delivers_end_of_stream() {
    let (server, client) = establish_pair().await;

    let mut outbound = client.open_stream().expect("open");
    outbound.send(b"last words").await.unwrap();
    outbound.finish().await;

    let mut inbound = server.accept_stream().await.expect("accept");
    assert_eq!(inbound.recv().await, Some(Bytes::from_static(b"last words")));
    assert_eq!(inbound.recv().await, None);
    assert!(inbound.is_closed());
}

#[tokio::test]
async fn test_peer_close_fires_cancellation() {
    let (server, client) = establish_pair().await;

    let closed = server.closed();
    assert!(!closed.is_cancelled());

    client.close();
    closed.cancelled().await;

    assert!(server.is_closed());
    assert!(matches!(server.open_stream(), Err(SessionError::Closed)));
}

#[tokio::test]
async fn test_close_unblocks_accept() {
    let (server, client) = establish_pair().await;

    let handle = tokio::spawn(async move { server.accept_stream().await.is_none() });

    client.close();
    assert!(handle.await.unwrap());
}

#[tokio::test]
async fn test_malformed_preamble_rejected() {
    let ((server_sink, server_source), (mut peer_sink, _peer_source)) = pair();

    // Peer speaks something that is not the session preamble.
    peer_sink
        .send_frame(Bytes::from_static(b"GET / HTTP/1.1"))
        .await
        .unwrap();

    let result = Session::establish(server_sink, server_source, SessionRole::Server).await;
    assert!(matches!(result, Err(SessionError::Handshake(_))));
}

#[tokio::test]
async fn test_peer_hangup_before_preamble() {
    let ((server_sink, server_source), (mut peer_sink, _peer_source)) = pair();

    peer_sink.close(None).await;

    let result = Session::establish(server_sink, server_source, SessionRole::Server).await;
    assert!(matches!(result, Err(SessionError::Handshake(_))));
}
