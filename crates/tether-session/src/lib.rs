//! Multiplexed session adapter
//!
//! Wraps one physical duplex connection (already upgraded to a
//! message-framed transport) into a session carrying many independent
//! logical sub-streams. The broker runs the server role on both of its
//! legs; multiplexing roles are independent of which side dialed the
//! outer connection.
//!
//! # Framing
//!
//! Each transport frame is prefixed with:
//! - 4 bytes: stream ID (big-endian u32)
//! - 1 byte: frame type (0=data, 1=fin)
//! - Rest: payload
//!
//! The first frame in each direction is a preamble (magic + protocol
//! version) exchanged before any sub-stream traffic; a malformed
//! preamble aborts the connection and no session is returned.

pub mod framed;
pub mod memory;
pub mod session;
pub mod stream;

pub use framed::{FrameSink, FrameSource};
pub use session::{Session, SessionRole};
pub use stream::SubStream;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Preamble exchange failed. The underlying connection has been
    /// closed with an abnormal-closure indication.
    #[error("session handshake: {0}")]
    Handshake(String),

    /// The underlying transport failed.
    #[error("session transport: {0}")]
    Transport(String),

    /// The session has been closed.
    #[error("session closed")]
    Closed,
}
