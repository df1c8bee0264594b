//! Incremental frame parser.
//!
//! Consumes one byte per call and reports a [`Frame`] once the trailing ETX
//! of a fully collected frame is seen. Bytes that do not fit the expected
//! layout never produce an error; the parser drops the partial frame and
//! resynchronises on the next STX.

use std::marker::PhantomData;

use bytes::Bytes;
use serialcmd_transport::Clock;
use tracing::{debug, trace, warn};

use crate::codec::{
    Frame, FrameConfig, OversizePolicy, TrailerPolicy, COMMAND_BUFFER_LEN, ETX, STX,
};
use crate::command::{CommandId, MAX_COMMAND_WIDTH};

/// Position of the parser within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseState {
    /// Discarding bytes until STX.
    AwaitingStart,
    /// Collecting the command identifier.
    AwaitingCommand,
    /// Next byte is the payload length.
    AwaitingLength,
    /// Collecting payload bytes.
    AwaitingPayload,
    /// Payload complete; next byte should be ETX.
    AwaitingEnd,
}

/// Why a partial frame was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The line went idle longer than the stale timeout mid-frame.
    Stale { state: ParseState },
    /// The declared length exceeds the receive buffer.
    FrameTooLarge { declared: usize, max: usize },
    /// STX arrived where ETX was expected; a new frame has started.
    Resync,
    /// Some other byte arrived where ETX was expected.
    MissingTrailer { byte: u8 },
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed<C> {
    /// Byte consumed; no frame boundary reached.
    Pending,
    /// The byte completed a frame.
    Complete(Frame<C>),
    /// A partial frame was discarded while handling this byte.
    Dropped(DropReason),
}

/// Running counters for a parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub frames: u64,
    pub stale_resets: u64,
    pub oversized: u64,
    pub resyncs: u64,
    pub missing_trailers: u64,
    /// Bytes ignored outside of any frame.
    pub discarded_bytes: u64,
}

impl ParserStats {
    /// Total partial frames abandoned for any reason.
    pub fn dropped(&self) -> u64 {
        self.stale_resets + self.oversized + self.resyncs + self.missing_trailers
    }
}

/// Byte-at-a-time STX/ETX frame parser.
///
/// `C` selects the command layout (single byte or two characters), `K`
/// supplies timestamps for stale-frame detection.
pub struct FrameParser<C, K> {
    state: ParseState,
    command: [u8; MAX_COMMAND_WIDTH],
    command_len: usize,
    declared_len: usize,
    received: usize,
    buf: [u8; COMMAND_BUFFER_LEN],
    last_rx_ms: Option<u64>,
    clock: K,
    config: FrameConfig,
    stats: ParserStats,
    _command: PhantomData<C>,
}

impl<C: CommandId, K: Clock> FrameParser<C, K> {
    /// Create a parser with default configuration.
    pub fn new(clock: K) -> Self {
        Self::with_config(clock, FrameConfig::default())
    }

    /// Create a parser with explicit configuration.
    ///
    /// `max_payload_size` is capped at the receive buffer size.
    pub fn with_config(clock: K, config: FrameConfig) -> Self {
        Self {
            state: ParseState::AwaitingStart,
            command: [0; MAX_COMMAND_WIDTH],
            command_len: 0,
            declared_len: 0,
            received: 0,
            buf: [0; COMMAND_BUFFER_LEN],
            last_rx_ms: None,
            clock,
            config,
            stats: ParserStats::default(),
            _command: PhantomData,
        }
    }

    /// Consume one byte from the link.
    pub fn feed(&mut self, byte: u8) -> Feed<C> {
        let now = self.clock.now_ms();
        let stale = self.expire_stale(now);
        self.last_rx_ms = Some(now);

        match (stale, self.step(byte)) {
            (Some(reason), Feed::Pending) => Feed::Dropped(reason),
            (_, outcome) => outcome,
        }
    }

    /// Feed a run of bytes, calling `on_frame` for every completed frame.
    ///
    /// Returns the number of frames completed.
    pub fn feed_slice(&mut self, bytes: &[u8], mut on_frame: impl FnMut(Frame<C>)) -> usize {
        let mut completed = 0usize;
        for &byte in bytes {
            if let Feed::Complete(frame) = self.feed(byte) {
                completed += 1;
                on_frame(frame);
            }
        }
        completed
    }

    /// Abandon any partial frame and wait for the next STX.
    pub fn reset(&mut self) {
        self.state = ParseState::AwaitingStart;
        self.command_len = 0;
        self.declared_len = 0;
        self.received = 0;
    }

    /// Current state of the machine.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Counters since construction.
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Current parser configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// The parser's time source.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    fn expire_stale(&mut self, now: u64) -> Option<DropReason> {
        let last = self.last_rx_ms?;
        if self.state == ParseState::AwaitingStart
            || now.saturating_sub(last) <= self.config.stale_timeout_ms()
        {
            return None;
        }

        let state = self.state;
        debug!(?state, idle_ms = now.saturating_sub(last), "stale frame abandoned");
        self.stats.stale_resets += 1;
        self.reset();
        Some(DropReason::Stale { state })
    }

    fn step(&mut self, byte: u8) -> Feed<C> {
        match self.state {
            ParseState::AwaitingStart => {
                if byte == STX {
                    self.begin_frame();
                } else {
                    self.stats.discarded_bytes += 1;
                }
                Feed::Pending
            }
            ParseState::AwaitingCommand => {
                self.command[self.command_len] = byte;
                self.command_len += 1;
                if self.command_len >= C::WIDTH {
                    self.state = ParseState::AwaitingLength;
                }
                Feed::Pending
            }
            ParseState::AwaitingLength => self.accept_length(byte),
            ParseState::AwaitingPayload => {
                self.buf[self.received] = byte;
                self.received += 1;
                if self.received >= self.declared_len {
                    self.state = ParseState::AwaitingEnd;
                }
                Feed::Pending
            }
            ParseState::AwaitingEnd => self.accept_trailer(byte),
        }
    }

    fn begin_frame(&mut self) {
        self.state = ParseState::AwaitingCommand;
        self.command = [0; MAX_COMMAND_WIDTH];
        self.command_len = 0;
        self.declared_len = 0;
        self.received = 0;
    }

    fn accept_length(&mut self, byte: u8) -> Feed<C> {
        let declared = usize::from(byte);
        let capacity = self.config.capacity();

        self.declared_len = if declared > capacity {
            match self.config.oversize_policy {
                OversizePolicy::Reject => {
                    warn!(declared, max = capacity, "frame too large, dropping");
                    self.stats.oversized += 1;
                    self.reset();
                    return Feed::Dropped(DropReason::FrameTooLarge {
                        declared,
                        max: capacity,
                    });
                }
                OversizePolicy::Clamp => {
                    warn!(declared, max = capacity, "frame too large, clamping");
                    self.stats.oversized += 1;
                    capacity
                }
            }
        } else {
            declared
        };

        self.state = if self.declared_len == 0 {
            ParseState::AwaitingEnd
        } else {
            ParseState::AwaitingPayload
        };
        Feed::Pending
    }

    fn accept_trailer(&mut self, byte: u8) -> Feed<C> {
        match byte {
            ETX => {
                self.state = ParseState::AwaitingStart;
                self.stats.frames += 1;
                let frame = self.take_frame();
                trace!(command = ?frame.command, len = frame.payload.len(), "frame complete");
                Feed::Complete(frame)
            }
            STX => {
                debug!("start sentinel before end sentinel, restarting frame");
                self.stats.resyncs += 1;
                self.begin_frame();
                Feed::Dropped(DropReason::Resync)
            }
            other => match self.config.trailer_policy {
                TrailerPolicy::Abort => {
                    debug!(byte = other, "missing end sentinel, dropping frame");
                    self.stats.missing_trailers += 1;
                    self.reset();
                    Feed::Dropped(DropReason::MissingTrailer { byte: other })
                }
                TrailerPolicy::Wait => {
                    self.stats.discarded_bytes += 1;
                    Feed::Pending
                }
            },
        }
    }

    fn take_frame(&self) -> Frame<C> {
        Frame {
            command: C::from_wire(self.command),
            payload: Bytes::copy_from_slice(&self.buf[..self.declared_len]),
        }
    }
}

impl<C, K> std::fmt::Debug for FrameParser<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameParser")
            .field("state", &self.state)
            .field("declared_len", &self.declared_len)
            .field("received", &self.received)
            .field("stats", &self.stats)
            .finish()
    }
}
