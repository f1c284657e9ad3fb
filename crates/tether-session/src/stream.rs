//! Logical sub-streams within a session

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::trace;

use crate::SessionError;

/// Frame type constants for stream multiplexing
pub(crate) const FRAME_DATA: u8 = 0;
pub(crate) const FRAME_FIN: u8 = 1;

/// Encode a multiplexed frame
pub(crate) fn encode_frame(stream_id: u32, frame_type: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(5 + payload.len());
    frame.extend_from_slice(&stream_id.to_be_bytes());
    frame.extend_from_slice(&[frame_type]);
    frame.extend_from_slice(payload);
    frame.freeze()
}

/// Decode a multiplexed frame header
pub(crate) fn decode_frame_header(data: &[u8]) -> Option<(u32, u8, &[u8])> {
    if data.len() < 5 {
        return None;
    }
    let stream_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let frame_type = data[4];
    let payload = &data[5..];
    Some((stream_id, frame_type, payload))
}

/// A logical sub-stream over a multiplexed session.
///
/// Owned by whichever side opened it; it has no lifecycle beyond its
/// session. Payload order within one sub-stream is preserved.
#[derive(Debug)]
pub struct SubStream {
    stream_id: u32,
    /// Payloads dispatched to this stream by the session reader task.
    /// `None` is the close signal, so zero-length payloads pass
    /// through intact.
    rx: mpsc::Receiver<Option<Bytes>>,
    /// Shared sender feeding the session writer task.
    tx: mpsc::Sender<Bytes>,
    closed: bool,
}

impl SubStream {
    pub(crate) fn new(
        stream_id: u32,
        rx: mpsc::Receiver<Option<Bytes>>,
        tx: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            stream_id,
            rx,
            tx,
            closed: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.stream_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one payload on this sub-stream.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        let frame = encode_frame(self.stream_id, FRAME_DATA, payload);
        self.tx
            .send(frame)
            .await
            .map_err(|_| SessionError::Closed)?;

        trace!(stream_id = self.stream_id, len = payload.len(), "sent");
        Ok(())
    }

    /// Receive the next payload, or `None` once the peer finished the
    /// stream or the session closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if self.closed {
            return None;
        }

        match self.rx.recv().await {
            Some(Some(payload)) => {
                trace!(stream_id = self.stream_id, len = payload.len(), "received");
                Some(payload)
            }
            Some(None) | None => {
                self.closed = true;
                None
            }
        }
    }

    /// Half-close this sub-stream. The peer observes end-of-stream.
    pub async fn finish(&mut self) {
        if self.closed {
            return;
        }

        let frame = encode_frame(self.stream_id, FRAME_FIN, &[]);
        // Ignore the error if the session is already gone.
        let _ = self.tx.send(frame).await;
        self.closed = true;
    }
}
