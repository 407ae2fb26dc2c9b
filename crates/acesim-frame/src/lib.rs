//! Serial frame protocol spoken by the emulated peripheral.
//!
//! Every message on the wire is framed as:
//! - A 2-byte header (`0xFF 0xAA`) used for stream synchronization
//! - A 2-byte little-endian payload length
//! - The payload itself
//! - A 2-byte little-endian CRC-16/MCRF4XX of the payload
//! - A 1-byte trailer (`0xFE`)
//!
//! The [`FrameParser`] is incremental: feed it whatever the serial line
//! produced and it hands back every frame completed so far.

pub mod codec;
pub mod crc;
pub mod error;
pub mod parser;

pub use codec::{
    encode_frame, encode_frame_with_crc, Frame, FRAME_OVERHEAD, HEADER, MAX_PAYLOAD, TRAILER,
};
pub use crc::crc16;
pub use error::{FrameError, Result};
pub use parser::{FrameParser, ParserState};
