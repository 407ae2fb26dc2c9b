use acesim_frame::{encode_frame, Frame};
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tracing::warn;

use crate::config::{DeviceConfig, ResponseMode};

/// Decides what the device sends back for a frame that passed validation.
pub trait Responder: Send {
    /// Reply bytes for `frame`, whose payload decoded to `message`.
    fn respond(&mut self, frame: &Frame, message: &Value) -> Option<Bytes>;
}

impl<R: Responder + ?Sized> Responder for Box<R> {
    fn respond(&mut self, frame: &Frame, message: &Value) -> Option<Bytes> {
        (**self).respond(frame, message)
    }
}

/// Replies with the same fixed bytes to every frame.
#[derive(Debug, Clone)]
pub struct AckResponder {
    reply: Bytes,
}

impl AckResponder {
    pub fn new(reply: impl Into<Bytes>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for AckResponder {
    fn default() -> Self {
        Self::new(Bytes::from_static(crate::config::DEFAULT_ACK))
    }
}

impl Responder for AckResponder {
    fn respond(&mut self, _frame: &Frame, _message: &Value) -> Option<Bytes> {
        Some(self.reply.clone())
    }
}

/// Replies with the frame payload unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&mut self, frame: &Frame, _message: &Value) -> Option<Bytes> {
        Some(frame.payload.clone())
    }
}

/// Wraps another responder's reply in a wire frame.
#[derive(Debug, Clone)]
pub struct Framed<R> {
    inner: R,
}

impl<R> Framed<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Responder> Responder for Framed<R> {
    fn respond(&mut self, frame: &Frame, message: &Value) -> Option<Bytes> {
        let reply = self.inner.respond(frame, message)?;
        let mut buf = BytesMut::new();
        match encode_frame(&reply, &mut buf) {
            Ok(()) => Some(buf.freeze()),
            Err(err) => {
                warn!(error = %err, "dropping reply that does not fit a frame");
                None
            }
        }
    }
}

/// Build the responder described by `config`.
pub fn from_config(config: &DeviceConfig) -> Box<dyn Responder> {
    let base: Box<dyn Responder> = match config.response_mode {
        ResponseMode::Ack => Box::new(AckResponder::new(config.ack_payload.clone())),
        ResponseMode::Echo => Box::new(EchoResponder),
    };
    if config.framed_responses {
        Box::new(Framed::new(base))
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use acesim_frame::FrameParser;

    use super::*;

    fn frame(payload: &'static [u8]) -> (Frame, Value) {
        let frame = Frame::sealed(Bytes::from_static(payload));
        let value = serde_json::from_slice(payload).unwrap();
        (frame, value)
    }

    #[test]
    fn ack_replies_with_fixed_bytes() {
        let (frame, value) = frame(br#"{"method":"get_info"}"#);
        let mut responder = AckResponder::default();
        assert_eq!(
            responder.respond(&frame, &value).unwrap().as_ref(),
            b"WE DID IT"
        );
    }

    #[test]
    fn echo_replies_with_payload() {
        let (frame, value) = frame(br#"{"id":3}"#);
        let mut responder = EchoResponder;
        assert_eq!(
            responder.respond(&frame, &value).unwrap().as_ref(),
            br#"{"id":3}"#
        );
    }

    #[test]
    fn framed_reply_parses_back() {
        let (frame, value) = frame(br#"{"id":4}"#);
        let mut responder = Framed::new(AckResponder::new(&b"ok"[..]));

        let wire = responder.respond(&frame, &value).unwrap();
        let frames = FrameParser::new().feed(&wire).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), b"ok");
        assert!(frames[0].crc_matches());
    }

    #[test]
    fn config_selects_responder() {
        let (frame, value) = frame(br#"[1,2]"#);
        let config = DeviceConfig {
            response_mode: ResponseMode::Echo,
            framed_responses: true,
            ..DeviceConfig::default()
        };

        let wire = from_config(&config).respond(&frame, &value).unwrap();
        let frames = FrameParser::new().feed(&wire).unwrap();
        assert_eq!(frames[0].payload.as_ref(), b"[1,2]");
    }
}
