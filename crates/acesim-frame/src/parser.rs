use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::codec::{Frame, HEADER, TRAILER};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Where the parser is within the frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Scanning for the first header byte.
    Idle,
    /// Saw `0xFF`, expecting `0xAA`.
    SawHeaderByte1,
    /// Collecting the little-endian length field.
    ReadingLength { acc: [u8; 2], count: u8 },
    /// Collecting `declared_len` payload bytes.
    ReadingPayload { declared_len: u16 },
    /// Collecting the little-endian CRC field.
    ReadingCrc { acc: [u8; 2], count: u8 },
    /// Waiting for the trailer byte.
    ReadingTrailer,
}

/// Incremental frame parser.
///
/// Bytes are buffered by [`extend`](Self::extend) and consumed one at a time by
/// [`parse`](Self::parse). Anything that does not line up with a header is
/// dropped silently, so the parser resynchronizes on its own after noise.
///
/// Once the CRC has been read, every byte other than `0xFE` is swallowed
/// while waiting for the trailer. This tolerance is intentional: trailing
/// garbage after a frame body never produces an error, at the cost of also
/// absorbing a following frame's header if the trailer went missing.
#[derive(Debug)]
pub struct FrameParser {
    buf: BytesMut,
    state: ParserState,
    payload: BytesMut,
    declared_crc: u16,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a parser in the idle state with empty buffers.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: ParserState::Idle,
            payload: BytesMut::new(),
            declared_crc: 0,
        }
    }

    /// Append bytes to the input buffer without parsing them.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Buffer `bytes` and return every frame completed by them, in wire order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.extend(bytes);
        self.parse()
    }

    /// Consume the whole input buffer, returning the frames it completed.
    ///
    /// A partially received frame stays in progress for the next call.
    pub fn parse(&mut self) -> Result<Vec<Frame>> {
        let mut input = std::mem::take(&mut self.buf);
        let mut frames = Vec::new();

        while input.has_remaining() {
            let byte = input.get_u8();
            match self.step(byte) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(err) => {
                    self.buf = input;
                    return Err(err);
                }
            }
        }

        self.buf = input;
        Ok(frames)
    }

    /// Current position within the frame layout.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Number of input bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered input and in-progress frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.payload.clear();
        self.declared_crc = 0;
        self.state = ParserState::Idle;
    }

    fn step(&mut self, byte: u8) -> Result<Option<Frame>> {
        match self.state {
            ParserState::Idle => {
                if byte == HEADER[0] {
                    self.state = ParserState::SawHeaderByte1;
                }
            }
            ParserState::SawHeaderByte1 => {
                if byte == HEADER[1] {
                    self.payload.clear();
                    self.declared_crc = 0;
                    self.state = ParserState::ReadingLength {
                        acc: [0; 2],
                        count: 0,
                    };
                } else if byte != HEADER[0] {
                    // A repeated 0xFF is itself a header candidate.
                    self.state = ParserState::Idle;
                }
            }
            ParserState::ReadingLength { mut acc, count } => {
                let slot = acc
                    .get_mut(usize::from(count))
                    .ok_or(FrameError::InconsistentState("length field overrun"))?;
                *slot = byte;
                let count = count + 1;
                self.state = if count < 2 {
                    ParserState::ReadingLength { acc, count }
                } else {
                    let declared_len = u16::from_le_bytes(acc);
                    if declared_len == 0 {
                        ParserState::ReadingCrc {
                            acc: [0; 2],
                            count: 0,
                        }
                    } else {
                        self.payload.reserve(usize::from(declared_len));
                        ParserState::ReadingPayload { declared_len }
                    }
                };
            }
            ParserState::ReadingPayload { declared_len } => {
                let declared_len_usize = usize::from(declared_len);
                if self.payload.len() >= declared_len_usize {
                    return Err(FrameError::InconsistentState("payload exceeds declared length"));
                }
                self.payload.put_u8(byte);
                if self.payload.len() == declared_len_usize {
                    self.state = ParserState::ReadingCrc {
                        acc: [0; 2],
                        count: 0,
                    };
                }
            }
            ParserState::ReadingCrc { mut acc, count } => {
                let slot = acc
                    .get_mut(usize::from(count))
                    .ok_or(FrameError::InconsistentState("crc field overrun"))?;
                *slot = byte;
                let count = count + 1;
                self.state = if count < 2 {
                    ParserState::ReadingCrc { acc, count }
                } else {
                    self.declared_crc = u16::from_le_bytes(acc);
                    ParserState::ReadingTrailer
                };
            }
            ParserState::ReadingTrailer => {
                if byte == TRAILER {
                    self.state = ParserState::Idle;
                    let frame = Frame::new(self.payload.split().freeze(), self.declared_crc);
                    trace!(
                        len = frame.payload.len(),
                        crc = frame.declared_crc,
                        "frame complete"
                    );
                    return Ok(Some(frame));
                }
            }
        }
        Ok(None)
    }
}
