use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::crc16;
use crate::error::{FrameError, Result};

/// Header bytes that open every frame.
pub const HEADER: [u8; 2] = [0xFF, 0xAA];

/// Byte that closes every frame.
pub const TRAILER: u8 = 0xFE;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Non-payload bytes on the wire: header (2) + length (2) + crc (2) + trailer (1).
pub const FRAME_OVERHEAD: usize = 7;

/// A frame as it arrived on the wire.
///
/// The parser does not judge `declared_crc`; whoever consumes the frame
/// decides whether it is authentic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame payload.
    pub payload: Bytes,
    /// CRC carried in the frame, as read from the wire.
    pub declared_crc: u16,
}

impl Frame {
    /// Create a frame with an explicit declared CRC.
    pub fn new(payload: impl Into<Bytes>, declared_crc: u16) -> Self {
        Self {
            payload: payload.into(),
            declared_crc,
        }
    }

    /// Create a frame whose declared CRC matches its payload.
    pub fn sealed(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let declared_crc = crc16(&payload);
        Self {
            payload,
            declared_crc,
        }
    }

    /// CRC-16/MCRF4XX of the payload.
    pub fn computed_crc(&self) -> u16 {
        crc16(&self.payload)
    }

    /// Whether the declared CRC matches the payload.
    pub fn crc_matches(&self) -> bool {
        self.computed_crc() == self.declared_crc
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Encode this frame, keeping its declared CRC as-is.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_frame_with_crc(&self.payload, self.declared_crc, dst)
    }
}

/// Encode a payload into the wire format with its computed CRC.
///
/// Wire format:
/// ```text
/// ┌────────────┬───────────┬──────────────┬───────────┬─────────┐
/// │ Header(2B) │ Length    │ Payload      │ CRC       │ Trailer │
/// │ 0xFF 0xAA  │ (2B LE)   │ (Length B)   │ (2B LE)   │ 0xFE    │
/// └────────────┴───────────┴──────────────┴───────────┴─────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    encode_frame_with_crc(payload, crc16(payload), dst)
}

/// Encode a payload with an explicit CRC, which may be deliberately wrong.
pub fn encode_frame_with_crc(payload: &[u8], crc: u16, dst: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_PAYLOAD,
    })?;
    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_slice(&HEADER);
    dst.put_u16_le(len);
    dst.put_slice(payload);
    dst.put_u16_le(crc);
    dst.put_u8(TRAILER);
    Ok(())
}
