//! WebSocket halves as session transport
//!
//! Adapts an upgraded axum [`WebSocket`] to the framed sink/source
//! pair the session adapter runs on. One binary message per frame;
//! text, ping and pong messages are not part of the protocol and are
//! skipped on receive.

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use tether_session::{FrameSink, FrameSource, SessionError};

pub struct WsFrameSink {
    tx: SplitSink<WebSocket, Message>,
}

pub struct WsFrameSource {
    rx: SplitStream<WebSocket>,
}

/// Split an upgraded socket into the session adapter's transport pair.
pub fn split(socket: WebSocket) -> (WsFrameSink, WsFrameSource) {
    let (tx, rx) = socket.split();
    (WsFrameSink { tx }, WsFrameSource { rx })
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), SessionError> {
        self.tx
            .send(Message::Binary(frame))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn close(&mut self, abnormal: Option<&str>) {
        let frame = match abnormal {
            Some(reason) => CloseFrame {
                code: close_code::ERROR,
                reason: reason.to_string().into(),
            },
            None => CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            },
        };
        // Best effort: the peer may already be gone.
        let _ = self.tx.send(Message::Close(Some(frame))).await;
        let _ = self.tx.close().await;
    }
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn recv_frame(&mut self) -> Result<Option<Bytes>, SessionError> {
        loop {
            match self.rx.next().await {
                Some(Ok(Message::Binary(frame))) => return Ok(Some(frame)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SessionError::Transport(e.to_string())),
            }
        }
    }
}
