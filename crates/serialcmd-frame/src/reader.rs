use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use serialcmd_transport::{Clock, SerialStream};

use crate::codec::{Frame, FrameConfig};
use crate::command::CommandId;
use crate::error::{FrameError, Result};
use crate::parser::{Feed, FrameParser};

const READ_CHUNK_SIZE: usize = 256;

/// Reads complete frames from any `Read` stream.
///
/// Every received byte goes through a [`FrameParser`], so noise, stale
/// partial frames and oversized frames are skipped transparently.
pub struct FrameReader<C, T, K> {
    inner: T,
    parser: FrameParser<C, K>,
    ready: VecDeque<Frame<C>>,
}

impl<C: CommandId, T: Read, K: Clock> FrameReader<C, T, K> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T, clock: K) -> Self {
        Self::with_config(inner, clock, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, clock: K, config: FrameConfig) -> Self {
        Self {
            inner,
            parser: FrameParser::with_config(clock, config),
            ready: VecDeque::new(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts surface as `FrameError::Io` with `WouldBlock` or
    /// `TimedOut`; the partial frame is kept and reading may resume.
    pub fn read_frame(&mut self) -> Result<Frame<C>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            for &byte in &chunk[..read] {
                if let Feed::Complete(frame) = self.parser.feed(byte) {
                    self.ready.push_back(frame);
                }
            }
        }
    }

    /// The parser driving this reader.
    pub fn parser(&self) -> &FrameParser<C, K> {
        &self.parser
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<C: CommandId, K: Clock> FrameReader<C, SerialStream, K> {
    /// Create a frame reader for `SerialStream` and apply read timeout from config.
    pub fn with_config_stream(inner: SerialStream, clock: K, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, clock, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use serialcmd_transport::{ManualClock, MonotonicClock};

    use super::*;
    use crate::codec::{encode_frame, ETX, STX};
    use crate::command::CommandPair;

    fn wire<C: CommandId>(frames: &[(C, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (command, payload) in frames {
            encode_frame(*command, Some(*payload), &mut buf);
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let bytes = wire(&[(0x01u8, &b"hello"[..])]);
        let mut reader = FrameReader::new(Cursor::new(bytes), MonotonicClock::new());
        let frame: Frame<u8> = reader.read_frame().unwrap();

        assert_eq!(frame.command, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_frames_from_one_chunk() {
        let bytes = wire(&[
            (0x01u8, &b"one"[..]),
            (0x02u8, &b"two"[..]),
            (0x03u8, &b"three"[..]),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes), ManualClock::new(0));

        let f1: Frame<u8> = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.command, f1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((f2.command, f2.payload.as_ref()), (2, b"two".as_ref()));
        assert_eq!((f3.command, f3.payload.as_ref()), (3, b"three".as_ref()));
    }

    #[test]
    fn skips_leading_noise() {
        let mut bytes = vec![0x00, ETX, 0x13, 0x37];
        bytes.extend(wire(&[(CommandPair::new(b'a', b'p'), &b"ssid"[..])]));

        let mut reader = FrameReader::new(Cursor::new(bytes), ManualClock::new(0));
        let frame: Frame<CommandPair> = reader.read_frame().unwrap();
        assert_eq!(frame.command.to_string(), "AP");
        assert_eq!(frame.payload.as_ref(), b"ssid");
        assert_eq!(reader.parser().stats().discarded_bytes, 4);
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[(0x04u8, &b"slow"[..])]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader, ManualClock::new(0));

        let frame: Frame<u8> = reader.read_frame().unwrap();
        assert_eq!(frame.command, 4);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader: FrameReader<u8, _, _> =
            FrameReader::new(Cursor::new(Vec::<u8>::new()), ManualClock::new(0));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut reader: FrameReader<u8, _, _> =
            FrameReader::new(Cursor::new(vec![STX, 0x01, 16, 1, 2, 3]), ManualClock::new(0));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[(0x08u8, &b"ok"[..])])),
        };
        let mut framed = FrameReader::new(reader, ManualClock::new(0));
        let frame: Frame<u8> = framed.read_frame().unwrap();

        assert_eq!(frame.command, 8);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[cfg(unix)]
    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right, MonotonicClock::new());

        writer.send(0x02u8, Some(b"1.0.0")).unwrap();
        writer.send(0x1Au8, None).unwrap();

        let f1: Frame<u8> = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        assert_eq!((f1.command, f1.payload.as_ref()), (0x02, b"1.0.0".as_ref()));
        assert_eq!((f2.command, f2.payload.len()), (0x1A, 0));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader: FrameReader<u8, _, _> =
            FrameReader::new(Cursor::new(Vec::<u8>::new()), ManualClock::new(0));

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
