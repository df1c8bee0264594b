//! One end of a serial command link.
//!
//! [`SerialInterface`] bundles the three pieces an endpoint needs: a parser
//! fed one byte at a time, the dispatcher it hands completed frames to, and
//! a writer for outbound commands. Inbound and outbound paths share no
//! state.

use std::io::{ErrorKind, Read, Write};

use serialcmd_transport::Clock;

use crate::codec::FrameConfig;
use crate::command::CommandId;
use crate::dispatch::{Dispatch, Dispatcher};
use crate::error::{FrameError, Result};
use crate::parser::{DropReason, Feed, FrameParser};
use crate::writer::FrameWriter;

const PUMP_CHUNK_SIZE: usize = 256;

/// What feeding a byte caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent<C> {
    /// Nothing observable yet.
    Pending,
    /// A frame completed and was routed.
    Dispatched { command: C, outcome: Dispatch },
    /// A partial frame was abandoned.
    Dropped(DropReason),
}

/// Parser + dispatcher + writer for one link.
pub struct SerialInterface<C, K, W> {
    parser: FrameParser<C, K>,
    dispatcher: Dispatcher<C>,
    writer: FrameWriter<W>,
}

impl<C: CommandId, K: Clock, W: Write> SerialInterface<C, K, W> {
    /// Create an interface with an empty dispatcher and default config.
    pub fn new(clock: K, sink: W) -> Self {
        Self::with_config(clock, sink, Dispatcher::new(), FrameConfig::default())
    }

    /// Create an interface from a prepared dispatcher and explicit config.
    pub fn with_config(clock: K, sink: W, dispatcher: Dispatcher<C>, config: FrameConfig) -> Self {
        Self {
            parser: FrameParser::with_config(clock, config.clone()),
            dispatcher,
            writer: FrameWriter::with_config(sink, config),
        }
    }

    /// Consume one received byte, dispatching synchronously if it completes
    /// a frame.
    pub fn feed(&mut self, byte: u8) -> FeedEvent<C> {
        match self.parser.feed(byte) {
            Feed::Pending => FeedEvent::Pending,
            Feed::Dropped(reason) => FeedEvent::Dropped(reason),
            Feed::Complete(frame) => {
                let outcome = self.dispatcher.dispatch(frame.command, frame.payload.as_ref());
                FeedEvent::Dispatched {
                    command: frame.command,
                    outcome,
                }
            }
        }
    }

    /// Feed every byte in order. Returns the number of frames dispatched
    /// (including fallback and unhandled frames).
    pub fn feed_all(&mut self, bytes: &[u8]) -> usize {
        bytes
            .iter()
            .filter(|&&byte| matches!(self.feed(byte), FeedEvent::Dispatched { .. }))
            .count()
    }

    /// Read one chunk from `source` and feed it.
    ///
    /// Returns the number of frames dispatched. EOF is reported as
    /// `FrameError::ConnectionClosed`; read timeouts surface as `Io`.
    pub fn pump<R: Read>(&mut self, source: &mut R) -> Result<usize> {
        let mut chunk = [0u8; PUMP_CHUNK_SIZE];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => return Ok(self.feed_all(&chunk[..n])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Install or replace the handler for `command`.
    pub fn register<F>(&mut self, command: C, handler: F) -> bool
    where
        F: FnMut(C, &[u8]) + Send + 'static,
    {
        self.dispatcher.register(command, handler)
    }

    /// Send a command, truncating oversized payloads.
    ///
    /// Returns the number of payload bytes sent.
    pub fn send(&mut self, command: C, payload: Option<&[u8]>) -> Result<usize> {
        self.writer.send(command, payload)
    }

    /// Send a command, rejecting oversized payloads.
    pub fn send_strict(&mut self, command: C, payload: &[u8]) -> Result<()> {
        self.writer.send_strict(command, payload)
    }

    pub fn parser(&self) -> &FrameParser<C, K> {
        &self.parser
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<C> {
        &mut self.dispatcher
    }

    pub fn writer_mut(&mut self) -> &mut FrameWriter<W> {
        &mut self.writer
    }

    /// Consume the interface and return the outbound sink.
    pub fn into_sink(self) -> W {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use bytes::BytesMut;
    use serialcmd_transport::ManualClock;

    use super::*;
    use crate::codec::{decode_frame, encode_frame, Frame, ETX, MAX_PAYLOAD_SIZE, STX};

    type Seen = Arc<Mutex<Vec<(u8, Vec<u8>)>>>;

    fn interface(seen: &Seen) -> (SerialInterface<u8, ManualClock, Vec<u8>>, ManualClock) {
        let clock = ManualClock::new(0);
        let mut iface = SerialInterface::new(clock.clone(), Vec::new());
        for command in [0x01u8, 0x02] {
            let seen = Arc::clone(seen);
            iface.register(command, move |cmd, payload| {
                seen.lock().unwrap().push((cmd, payload.to_vec()))
            });
        }
        (iface, clock)
    }

    fn wire(command: u8, payload: Option<&[u8]>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(command, payload, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn encoded_frame_dispatches_exactly_once() {
        let seen = Seen::default();
        let (mut iface, _clock) = interface(&seen);

        let dispatched = iface.feed_all(&wire(0x01, Some(b"payload")));
        assert_eq!(dispatched, 1);
        assert_eq!(*seen.lock().unwrap(), vec![(0x01, b"payload".to_vec())]);
    }

    #[test]
    fn empty_frame_dispatches_empty_payload() {
        let seen = Seen::default();
        let (mut iface, _clock) = interface(&seen);

        for byte in [STX, 0x02, 0] {
            assert_eq!(iface.feed(byte), FeedEvent::Pending);
        }
        assert_eq!(
            iface.feed(ETX),
            FeedEvent::Dispatched {
                command: 0x02,
                outcome: Dispatch::Handled
            }
        );
        assert_eq!(*seen.lock().unwrap(), vec![(0x02, Vec::new())]);
    }

    #[test]
    fn stale_first_frame_is_discarded() {
        let seen = Seen::default();
        let (mut iface, clock) = interface(&seen);

        let first = wire(0x01, Some(b"lost-frame"));
        iface.feed_all(&first[..6]);
        clock.advance(50);
        iface.feed_all(&wire(0x02, Some(b"kept")));

        assert_eq!(*seen.lock().unwrap(), vec![(0x02, b"kept".to_vec())]);
        assert_eq!(iface.parser().stats().stale_resets, 1);
    }

    #[test]
    fn unknown_command_goes_to_fallback_only() {
        let fallback_calls = Arc::new(Mutex::new(Vec::new()));
        let known_calls = Arc::new(Mutex::new(0usize));

        let dispatcher = {
            let fallback_calls = Arc::clone(&fallback_calls);
            let known_calls = Arc::clone(&known_calls);
            Dispatcher::builder()
                .on(0x01u8, move |_, _| *known_calls.lock().unwrap() += 1)
                .fallback(0x1C, move |cmd, _| fallback_calls.lock().unwrap().push(cmd))
                .build()
        };
        let mut iface = SerialInterface::with_config(
            ManualClock::new(0),
            Vec::new(),
            dispatcher,
            FrameConfig::default(),
        );

        iface.feed_all(&wire(0x09, None));
        assert_eq!(*fallback_calls.lock().unwrap(), vec![0x09]);
        assert_eq!(*known_calls.lock().unwrap(), 0);
    }

    #[test]
    fn back_to_back_frames_dispatch_in_order() {
        let seen = Seen::default();
        let (mut iface, _clock) = interface(&seen);

        let mut bytes = wire(0x02, Some(&[9; 40]));
        bytes.extend(wire(0x01, Some(&[1, 2])));
        bytes.extend(wire(0x02, None));
        assert_eq!(iface.feed_all(&bytes), 3);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0x02, vec![9; 40]), (0x01, vec![1, 2]), (0x02, Vec::new())]
        );
    }

    #[test]
    fn oversized_send_round_trips_truncated() {
        let seen = Seen::default();
        let (mut iface, _clock) = interface(&seen);

        let payload: Vec<u8> = (0..=255u8).collect();
        let sent = iface.send(0x01, Some(&payload)).unwrap();
        assert_eq!(sent, MAX_PAYLOAD_SIZE);

        let bytes = iface.into_sink();
        let frame: Frame<u8> = decode_frame(&bytes).unwrap();
        assert_eq!(frame.payload.as_ref(), &payload[..MAX_PAYLOAD_SIZE]);

        let (mut receiver, _clock) = interface(&seen);
        receiver.feed_all(&bytes);
        assert_eq!(seen.lock().unwrap()[0].1, payload[..MAX_PAYLOAD_SIZE].to_vec());
    }

    #[test]
    fn pump_reads_until_eof() {
        let seen = Seen::default();
        let (mut iface, _clock) = interface(&seen);

        let mut source = Cursor::new(wire(0x01, Some(b"pumped")));
        assert_eq!(iface.pump(&mut source).unwrap(), 1);
        assert!(matches!(
            iface.pump(&mut source),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn send_strict_keeps_sink_clean_on_error() {
        let seen = Seen::default();
        let (mut iface, _clock) = interface(&seen);

        assert!(iface.send_strict(0x01, &[0; 200]).is_err());
        assert!(iface.writer_mut().get_ref().is_empty());
    }
}
