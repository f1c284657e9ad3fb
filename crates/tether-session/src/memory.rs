//! In-process framed duplex pair
//!
//! Backs the test benches and any in-process peer; each side gets a
//! sink/source pair whose frames arrive at the other side in order.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{FrameSink, FrameSource, SessionError};

const PIPE_CAPACITY: usize = 256;

/// Write half of an in-memory duplex.
pub struct MemorySink {
    tx: Option<mpsc::Sender<Bytes>>,
}

/// Read half of an in-memory duplex.
pub struct MemorySource {
    rx: mpsc::Receiver<Bytes>,
}

/// Create a connected duplex pair: frames sent on one side's sink
/// arrive on the other side's source.
pub fn pair() -> ((MemorySink, MemorySource), (MemorySink, MemorySource)) {
    let (a_tx, b_rx) = mpsc::channel(PIPE_CAPACITY);
    let (b_tx, a_rx) = mpsc::channel(PIPE_CAPACITY);

    (
        (MemorySink { tx: Some(a_tx) }, MemorySource { rx: a_rx }),
        (MemorySink { tx: Some(b_tx) }, MemorySource { rx: b_rx }),
    )
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), SessionError> {
        let Some(tx) = &self.tx else {
            return Err(SessionError::Closed);
        };
        tx.send(frame)
            .await
            .map_err(|_| SessionError::Transport("peer hung up".to_string()))
    }

    async fn close(&mut self, abnormal: Option<&str>) {
        if let Some(reason) = abnormal {
            trace!(reason, "memory duplex closed abnormally");
        }
        // Dropping the sender delivers end-of-stream to the peer.
        self.tx = None;
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv_frame(&mut self) -> Result<Option<Bytes>, SessionError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_pair() {
        let ((mut left_sink, _left_source), (_right_sink, mut right_source)) = pair();

        left_sink
            .send_frame(Bytes::from_static(b"over"))
            .await
            .unwrap();
        assert_eq!(
            right_source.recv_frame().await.unwrap(),
            Some(Bytes::from_static(b"over"))
        );
    }

    #[tokio::test]
    async fn test_close_delivers_eof() {
        let ((mut left_sink, _left_source), (_right_sink, mut right_source)) = pair();

        left_sink.close(None).await;
        assert_eq!(right_source.recv_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let ((mut left_sink, _), (_, _)) = pair();
        left_sink.close(None).await;
        assert!(left_sink.send_frame(Bytes::from_static(b"x")).await.is_err());
    }
}
