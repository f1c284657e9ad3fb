//! Transport seam for the session adapter
//!
//! The adapter works over any framed duplex transport: one call to
//! [`FrameSink::send_frame`] produces exactly one message on the wire,
//! and one wire message yields exactly one [`FrameSource::recv_frame`].

use async_trait::async_trait;
use bytes::Bytes;

use crate::SessionError;

/// Write half of a framed duplex connection.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Send one binary frame.
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), SessionError>;

    /// Close the underlying connection. `abnormal` carries the causing
    /// error text for the peer's diagnostics; `None` is a normal
    /// closure.
    async fn close(&mut self, abnormal: Option<&str>);
}

/// Read half of a framed duplex connection.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Receive the next binary frame, or `None` once the peer has
    /// closed cleanly.
    async fn recv_frame(&mut self) -> Result<Option<Bytes>, SessionError>;
}
