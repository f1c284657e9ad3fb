//! Length-prefixed bincode codec for signaling messages
//!
//! Wire format: 4 bytes big-endian payload length, then the bincode
//! body. Used both for bus payloads and for negotiation traffic framed
//! onto sub-streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::signal::Signal;
use crate::MAX_SIGNAL_SIZE;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialize signal: {0}")]
    Serialize(#[source] bincode::Error),

    #[error("deserialize signal: {0}")]
    Deserialize(#[source] bincode::Error),

    #[error("signal too large: {0} bytes")]
    TooLarge(usize),
}

/// Encoder/decoder for [`Signal`] values.
pub struct SignalCodec;

impl SignalCodec {
    /// Header size: payload length (4 bytes)
    pub const HEADER_SIZE: usize = 4;

    /// Encode a signal into a length-prefixed frame.
    pub fn encode(signal: &Signal) -> Result<Bytes, CodecError> {
        let body = bincode::serialize(signal).map_err(CodecError::Serialize)?;
        if body.len() > MAX_SIGNAL_SIZE as usize {
            return Err(CodecError::TooLarge(body.len()));
        }

        let mut buf = BytesMut::with_capacity(Self::HEADER_SIZE + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode one signal from the front of `buf`, if a complete frame
    /// is available. Consumes the decoded bytes.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Signal>, CodecError> {
        if buf.len() < Self::HEADER_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if length > MAX_SIGNAL_SIZE as usize {
            return Err(CodecError::TooLarge(length));
        }
        if buf.len() < Self::HEADER_SIZE + length {
            return Ok(None);
        }

        buf.advance(Self::HEADER_SIZE);
        let body = buf.split_to(length);
        let signal = bincode::deserialize(&body).map_err(CodecError::Deserialize)?;
        Ok(Some(signal))
    }

    /// Decode a signal from a complete standalone frame, as delivered
    /// by the bus (one publish = one frame).
    pub fn decode_frame(frame: &[u8]) -> Result<Signal, CodecError> {
        let mut buf = BytesMut::from(frame);
        match Self::decode(&mut buf)? {
            Some(signal) => Ok(signal),
            None => Err(CodecError::Deserialize(Box::new(
                bincode::ErrorKind::Custom("truncated signal frame".to_string()),
            ))),
        }
    }
}
