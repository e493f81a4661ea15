//! Length-delimited JSON frame codec.
//!
//! Wire format: 4-byte big-endian length prefix + serde JSON payload.
//! Frames decode to raw [`serde_json::Value`]s so the receiving side can
//! run the structural validator before committing to a typed decode.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::{ProtocolError, MAX_FRAME_BYTES};

/// Length prefix size in bytes.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Codec for framing JSON values over a byte stream.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least the length prefix
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        // Peek at the length
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_BYTES,
            });
        }

        // Check if we have the full frame
        let total = LENGTH_PREFIX_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        // Consume the length prefix, then the payload
        src.advance(LENGTH_PREFIX_SIZE);
        let frame_bytes = src.split_to(length);

        let value: Value = serde_json::from_slice(&frame_bytes)?;
        Ok(Some(value))
    }
}

impl Encoder<Value> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;

        if payload.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_BYTES,
            });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}
