//! Session establishment and frame dispatch

use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use tether_proto::{PREAMBLE_MAGIC, PROTOCOL_VERSION};

use crate::stream::{decode_frame_header, SubStream, FRAME_DATA, FRAME_FIN};
use crate::{FrameSink, FrameSource, SessionError};

/// Multiplexing role, independent of which side dialed the outer
/// connection. The broker always takes [`SessionRole::Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Even stream IDs.
    Server,
    /// Odd stream IDs.
    Client,
}

/// A multiplexed session over one framed duplex connection.
///
/// Dropping the session tears down the writer task and closes the
/// underlying connection.
pub struct Session {
    session_id: String,
    /// Pre-encoded frames bound for the writer task.
    frame_tx: mpsc::Sender<Bytes>,
    /// Stream ID to per-stream payload sender, owned jointly with the
    /// reader task. `None` on the channel is the close signal.
    streams: Arc<RwLock<HashMap<u32, mpsc::Sender<Option<Bytes>>>>>,
    /// Inbound streams opened by the peer.
    accept_rx: Mutex<mpsc::Receiver<(u32, mpsc::Receiver<Option<Bytes>>)>>,
    next_stream_id: AtomicU32,
    cancel: CancellationToken,
    close_reason: Arc<StdMutex<Option<String>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

fn encode_preamble() -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.extend_from_slice(&PREAMBLE_MAGIC);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.freeze()
}

fn validate_preamble(frame: &[u8]) -> Result<(), String> {
    if frame.len() != 8 {
        return Err(format!("preamble length {} != 8", frame.len()));
    }
    if frame[..4] != PREAMBLE_MAGIC {
        return Err("bad preamble magic".to_string());
    }
    let version = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    if version != PROTOCOL_VERSION {
        return Err(format!(
            "protocol version mismatch: peer {version}, local {PROTOCOL_VERSION}"
        ));
    }
    Ok(())
}

impl Session {
    /// Establish a session over an already-connected framed duplex
    /// transport.
    ///
    /// Exchanges preambles before any multiplexed traffic. On a
    /// malformed or mismatched preamble the connection is closed with
    /// an abnormal-closure indication and no session is returned.
    pub async fn establish<S, R>(
        mut sink: S,
        mut source: R,
        role: SessionRole,
    ) -> Result<Self, SessionError>
    where
        S: FrameSink,
        R: FrameSource,
    {
        sink.send_frame(encode_preamble()).await?;

        let peer_preamble = match source.recv_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                sink.close(Some("connection closed before preamble")).await;
                return Err(SessionError::Handshake(
                    "connection closed before preamble".to_string(),
                ));
            }
            Err(e) => {
                let reason = format!("receive preamble: {e}");
                sink.close(Some(&reason)).await;
                return Err(SessionError::Handshake(reason));
            }
        };

        if let Err(reason) = validate_preamble(&peer_preamble) {
            sink.close(Some(&reason)).await;
            return Err(SessionError::Handshake(reason));
        }

        let session_id = format!("sess-{}", uuid_like());
        debug!(session = %session_id, ?role, "session established");

        let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(256);
        let (accept_tx, accept_rx) = mpsc::channel(64);
        let streams: Arc<RwLock<HashMap<u32, mpsc::Sender<Option<Bytes>>>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let cancel = CancellationToken::new();
        let close_reason = Arc::new(StdMutex::new(None));

        // Server uses even stream IDs, client uses odd.
        let next_stream_id = match role {
            SessionRole::Server => 2,
            SessionRole::Client => 1,
        };

        tokio::spawn(writer_task(
            sink,
            frame_rx,
            cancel.clone(),
            close_reason.clone(),
            session_id.clone(),
        ));
        tokio::spawn(reader_task(
            source,
            streams.clone(),
            accept_tx,
            cancel.clone(),
            session_id.clone(),
        ));

        Ok(Self {
            session_id,
            frame_tx,
            streams,
            accept_rx: Mutex::new(accept_rx),
            next_stream_id: AtomicU32::new(next_stream_id),
            cancel,
            close_reason,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open a new outbound sub-stream.
    pub fn open_stream(&self) -> Result<SubStream, SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }

        // Increment by 2 to keep odd/even parity with the peer.
        let stream_id = self.next_stream_id.fetch_add(2, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(256);
        self.streams.write().unwrap().insert(stream_id, tx);

        trace!(session = %self.session_id, stream_id, "opened stream");
        Ok(SubStream::new(stream_id, rx, self.frame_tx.clone()))
    }

    /// Accept the next sub-stream opened by the peer, or `None` once
    /// the session is closed.
    pub async fn accept_stream(&self) -> Option<SubStream> {
        let mut accept_rx = self.accept_rx.lock().await;
        let (stream_id, rx) = accept_rx.recv().await?;

        trace!(session = %self.session_id, stream_id, "accepted stream");
        Some(SubStream::new(stream_id, rx, self.frame_tx.clone()))
    }

    /// Cancellation signal that fires exactly once, when the underlying
    /// connection is lost or the session is explicitly closed.
    pub fn closed(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close the session normally.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Close the session with an abnormal-closure indication carrying
    /// the causing error text.
    pub fn close_with_error(&self, reason: &str) {
        {
            let mut slot = self.close_reason.lock().unwrap();
            slot.get_or_insert_with(|| reason.to_string());
        }
        self.cancel.cancel();
    }
}

// Session IDs only need to be unique within a process lifetime for log
// correlation.
fn uuid_like() -> String {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{:08x}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

async fn writer_task<S: FrameSink>(
    mut sink: S,
    mut frame_rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    close_reason: Arc<StdMutex<Option<String>>>,
    session_id: String,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let reason = close_reason.lock().unwrap().take();
                sink.close(reason.as_deref()).await;
                break;
            }
            frame = frame_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send_frame(frame).await {
                        warn!(session = %session_id, error = %e, "frame send failed");
                        cancel.cancel();
                        sink.close(Some(&e.to_string())).await;
                        break;
                    }
                }
                None => {
                    // Session and all sub-streams dropped.
                    cancel.cancel();
                    sink.close(None).await;
                    break;
                }
            }
        }
    }

    trace!(session = %session_id, "writer task ended");
}

async fn reader_task<R: FrameSource>(
    mut source: R,
    streams: Arc<RwLock<HashMap<u32, mpsc::Sender<Option<Bytes>>>>>,
    accept_tx: mpsc::Sender<(u32, mpsc::Receiver<Option<Bytes>>)>,
    cancel: CancellationToken,
    session_id: String,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.recv_frame() => match result {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(session = %session_id, "peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(session = %session_id, error = %e, "frame receive failed");
                    break;
                }
            },
        };

        let Some((stream_id, frame_type, payload)) = decode_frame_header(&frame) else {
            warn!(session = %session_id, len = frame.len(), "invalid frame");
            continue;
        };

        let existing = {
            let streams = streams.read().unwrap();
            streams.get(&stream_id).cloned()
        };

        match (frame_type, existing) {
            (FRAME_DATA, Some(tx)) => {
                if tx.send(Some(Bytes::copy_from_slice(payload))).await.is_err() {
                    // Receiver dropped; forget the stream.
                    streams.write().unwrap().remove(&stream_id);
                }
            }
            (FRAME_DATA, None) => {
                // New inbound stream, created implicitly by its first
                // data frame.
                let (tx, rx) = mpsc::channel(256);
                if tx.send(Some(Bytes::copy_from_slice(payload))).await.is_ok() {
                    streams.write().unwrap().insert(stream_id, tx);
                    if accept_tx.send((stream_id, rx)).await.is_err() {
                        warn!(session = %session_id, stream_id, "accept queue closed, dropping stream");
                        streams.write().unwrap().remove(&stream_id);
                    }
                }
            }
            (FRAME_FIN, Some(tx)) => {
                let _ = tx.send(None).await;
                streams.write().unwrap().remove(&stream_id);
            }
            (FRAME_FIN, None) => {}
            (other, _) => {
                warn!(session = %session_id, frame_type = other, "unknown frame type");
            }
        }
    }

    cancel.cancel();

    // Deliver the close signal to every open stream.
    let senders: Vec<_> = {
        let streams = streams.read().unwrap();
        streams.values().cloned().collect()
    };
    for tx in senders {
        let _ = tx.send(None).await;
    }

    trace!(session = %session_id, "reader task ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_round_trip() {
        let frame = encode_preamble();
        assert!(validate_preamble(&frame).is_ok());
    }

    #[test]
    fn test_preamble_bad_magic() {
        let mut frame = encode_preamble().to_vec();
        frame[0] = b'X';
        assert!(validate_preamble(&frame).is_err());
    }

    #[test]
    fn test_preamble_version_mismatch() {
        let mut frame = encode_preamble().to_vec();
        frame[7] = frame[7].wrapping_add(1);
        let err = validate_preamble(&frame).unwrap_err();
        assert!(err.contains("version"));
    }

    #[test]
    fn test_preamble_truncated() {
        assert!(validate_preamble(&[1, 2, 3]).is_err());
    }
}
