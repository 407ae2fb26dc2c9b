use std::sync::Arc;
use std::time::Duration;

use acesim_frame::{Frame, FrameParser};
use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::DeviceConfig;
use crate::error::Result;
use crate::responder::{self, Responder};
use crate::stats::DeviceStats;
use crate::watchdog::PingSignal;

/// Pause after a zero-length read so an idle endpoint is not polled hot.
const EMPTY_READ_PAUSE: Duration = Duration::from_millis(10);

/// Reads frames from the endpoint, validates them and answers the host.
///
/// Every received frame pings the watchdog before anything else happens to
/// it, whether or not its CRC turns out to be valid. Frames with a bad CRC
/// or a payload that is not JSON are dropped without a reply.
pub struct Session {
    read_chunk_size: usize,
    responder: Box<dyn Responder>,
    stats: Arc<DeviceStats>,
}

impl Session {
    pub fn new(
        read_chunk_size: usize,
        responder: Box<dyn Responder>,
        stats: Arc<DeviceStats>,
    ) -> Self {
        Self {
            read_chunk_size: read_chunk_size.max(1),
            responder,
            stats,
        }
    }

    pub fn from_config(config: &DeviceConfig, stats: Arc<DeviceStats>) -> Self {
        Self::new(config.read_chunk_size, responder::from_config(config), stats)
    }

    /// Serve `io` until `cancel` fires.
    ///
    /// Returns `Ok(())` only on cancellation. Endpoint I/O failures and
    /// parser consistency faults are returned as errors and are not retried.
    pub async fn run<T>(
        &mut self,
        io: &mut T,
        parser: &mut FrameParser,
        signal: &PingSignal,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut chunk = vec![0u8; self.read_chunk_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                read = io.read(&mut chunk) => read?,
            };

            if read == 0 {
                trace!("zero-length read");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(EMPTY_READ_PAUSE) => continue,
                }
            }

            for frame in parser.feed(&chunk[..read])? {
                signal.ping();

                let Some(reply) = self.process(&frame) else {
                    continue;
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    written = write_reply(io, &reply) => written?,
                }
                self.stats.record_response();
                trace!(len = reply.len(), "reply sent");
            }
        }
    }

    /// Validate one frame and produce the reply for it, if any.
    pub fn process(&mut self, frame: &Frame) -> Option<Bytes> {
        self.stats.record_frame();

        if !frame.crc_matches() {
            self.stats.record_crc_mismatch();
            debug!(
                declared = frame.declared_crc,
                computed = frame.computed_crc(),
                len = frame.payload.len(),
                "discarding frame with bad crc"
            );
            return None;
        }

        let message: Value = match serde_json::from_slice(&frame.payload) {
            Ok(message) => message,
            Err(err) => {
                self.stats.record_decode_failure();
                debug!(error = %err, len = frame.payload.len(), "discarding undecodable frame");
                return None;
            }
        };

        self.responder.respond(frame, &message)
    }
}

async fn write_reply<T: AsyncWrite + Unpin>(io: &mut T, reply: &[u8]) -> std::io::Result<()> {
    io.write_all(reply).await?;
    io.flush().await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use acesim_frame::{crc16, encode_frame, encode_frame_with_crc};
    use bytes::BytesMut;
    use tokio::io::{duplex, ReadBuf};

    use super::*;
    use crate::error::DeviceError;
    use crate::responder::AckResponder;

    fn wire(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn ack_session(stats: &Arc<DeviceStats>) -> Session {
        Session::new(64, Box::new(AckResponder::default()), Arc::clone(stats))
    }

    #[tokio::test]
    async fn valid_json_frame_gets_ack() {
        let (mut client, mut device) = duplex(1024);
        let stats = Arc::new(DeviceStats::new());
        let mut session = ack_session(&stats);
        let mut parser = FrameParser::new();
        let signal = PingSignal::new();
        let cancel = CancellationToken::new();

        let host = async {
            client.write_all(&wire(br#"{"method":"get_status"}"#)).await.unwrap();
            let mut reply = [0u8; 9];
            client.read_exact(&mut reply).await.unwrap();
            cancel.cancel();
            reply
        };
        let (result, reply) = tokio::join!(
            session.run(&mut device, &mut parser, &signal, &cancel),
            host
        );

        result.unwrap();
        assert_eq!(&reply, b"WE DID IT");
        assert_eq!(signal.pings(), 1);
        assert_eq!(stats.snapshot().responses_sent, 1);
    }

    #[tokio::test]
    async fn bad_crc_and_undecodable_frames_get_no_reply() {
        let (mut client, mut device) = duplex(1024);
        let stats = Arc::new(DeviceStats::new());
        let mut session = ack_session(&stats);
        let mut parser = FrameParser::new();
        let signal = PingSignal::new();
        let cancel = CancellationToken::new();

        let mut bytes = BytesMut::new();
        let payload = br#"{"id":1}"#;
        encode_frame_with_crc(payload, crc16(payload) ^ 0xFFFF, &mut bytes).unwrap();
        encode_frame(b"not json", &mut bytes).unwrap();
        encode_frame(b"", &mut bytes).unwrap();
        encode_frame(br#"{"id":2}"#, &mut bytes).unwrap();

        let host = async {
            client.write_all(&bytes).await.unwrap();
            let mut reply = [0u8; 9];
            client.read_exact(&mut reply).await.unwrap();
            cancel.cancel();
            reply
        };
        let (result, reply) = tokio::join!(
            session.run(&mut device, &mut parser, &signal, &cancel),
            host
        );
        result.unwrap();
        drop(device);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();

        assert_eq!(&reply, b"WE DID IT");
        assert!(rest.is_empty(), "only the last frame should be answered");
        assert_eq!(signal.pings(), 4, "every frame pings, valid or not");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_received, 4);
        assert_eq!(snapshot.crc_mismatches, 1);
        assert_eq!(snapshot.decode_failures, 2);
        assert_eq!(snapshot.responses_sent, 1);
    }

    #[tokio::test]
    async fn empty_frame_pings_without_reply() {
        let crc = crc16(&[]).to_le_bytes();
        let mut io = ScriptedIo::new(vec![vec![0xFF, 0xAA, 0x00, 0x00, crc[0], crc[1], 0xFE]]);
        let stats = Arc::new(DeviceStats::new());
        let mut session = ack_session(&stats);
        let mut parser = FrameParser::new();
        let signal = PingSignal::new();
        let cancel = CancellationToken::new();

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            session.run(&mut io, &mut parser, &signal, &cancel),
            stopper
        );

        result.unwrap();
        assert_eq!(signal.pings(), 1);
        assert!(io.written.is_empty());
        assert_eq!(stats.snapshot().decode_failures, 1);
    }

    #[tokio::test]
    async fn zero_length_reads_do_not_end_session() {
        let mut io = ScriptedIo::new(vec![Vec::new(), Vec::new(), wire(b"{}")]);
        let stats = Arc::new(DeviceStats::new());
        let mut session = ack_session(&stats);
        let mut parser = FrameParser::new();
        let signal = PingSignal::new();
        let cancel = CancellationToken::new();

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            session.run(&mut io, &mut parser, &signal, &cancel),
            stopper
        );

        result.unwrap();
        assert_eq!(io.written, b"WE DID IT");
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled() {
        let bytes = wire(br#"{"split":true}"#);
        let chunks = bytes.chunks(3).map(<[u8]>::to_vec).collect();
        let mut io = ScriptedIo::new(chunks);
        let stats = Arc::new(DeviceStats::new());
        let mut session = ack_session(&stats);
        let mut parser = FrameParser::new();
        let signal = PingSignal::new();
        let cancel = CancellationToken::new();

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            session.run(&mut io, &mut parser, &signal, &cancel),
            stopper
        );

        result.unwrap();
        assert_eq!(signal.pings(), 1);
        assert_eq!(io.written, b"WE DID IT");
    }

    #[tokio::test]
    async fn ping_precedes_processing() {
        struct PingProbe {
            signal: Arc<PingSignal>,
            seen: Arc<std::sync::Mutex<Vec<u64>>>,
        }

        impl Responder for PingProbe {
            fn respond(&mut self, _frame: &Frame, _message: &Value) -> Option<Bytes> {
                self.seen.lock().unwrap().push(self.signal.pings());
                None
            }
        }

        let signal = Arc::new(PingSignal::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let probe = PingProbe {
            signal: Arc::clone(&signal),
            seen: Arc::clone(&seen),
        };
        let mut bytes = wire(b"1");
        bytes.extend(wire(b"2"));
        bytes.extend(wire(b"3"));
        let mut io = ScriptedIo::new(vec![bytes]);
        let mut session = Session::new(64, Box::new(probe), Arc::new(DeviceStats::new()));
        let mut parser = FrameParser::new();
        let cancel = CancellationToken::new();

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            session.run(&mut io, &mut parser, &signal, &cancel),
            stopper
        );

        result.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn endpoint_error_is_fatal() {
        let mut io = ScriptedIo::failing(io::ErrorKind::BrokenPipe);
        let mut session = ack_session(&Arc::new(DeviceStats::new()));
        let mut parser = FrameParser::new();
        let signal = PingSignal::new();
        let cancel = CancellationToken::new();

        let result = session.run(&mut io, &mut parser, &signal, &cancel).await;

        assert!(matches!(
            result,
            Err(DeviceError::Io(err)) if err.kind() == io::ErrorKind::BrokenPipe
        ));
    }

    /// Serves scripted reads (an empty entry is a zero-length read), then
    /// stays pending forever. Records everything written.
    struct ScriptedIo {
        reads: VecDeque<Vec<u8>>,
        fail_with: Option<io::ErrorKind>,
        written: Vec<u8>,
    }

    impl ScriptedIo {
        fn new(reads: Vec<Vec<u8>>) -> Self {
            Self {
                reads: reads.into(),
                fail_with: None,
                written: Vec::new(),
            }
        }

        fn failing(kind: io::ErrorKind) -> Self {
            Self {
                reads: VecDeque::new(),
                fail_with: Some(kind),
                written: Vec::new(),
            }
        }
    }

    impl AsyncRead for ScriptedIo {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(kind) = self.fail_with {
                return Poll::Ready(Err(io::Error::from(kind)));
            }
            match self.reads.pop_front() {
                Some(chunk) => {
                    buf.put_slice(&chunk);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Pending,
            }
        }
    }

    impl AsyncWrite for ScriptedIo {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
