//! Broker Signaling Protocol
//!
//! This crate defines the envelope messages the broker moves over the
//! pub/sub bus between a dialing client session and a listening agent
//! session, plus the wire codec used on both the bus and the
//! multiplexed sub-streams.

pub mod codec;
pub mod signal;

pub use codec::{CodecError, SignalCodec};
pub use signal::{dial_channel, exchange_channel, PeerEnd, Signal};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Magic bytes opening every session preamble
pub const PREAMBLE_MAGIC: [u8; 4] = *b"TETH";

/// Maximum encoded signal size (16MB)
pub const MAX_SIGNAL_SIZE: u32 = 16 * 1024 * 1024;
