use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use serialcmd_transport::SerialStream;

use crate::codec::{encode_frame_limited, wire_size, Frame, FrameConfig, MAX_PAYLOAD_SIZE};
use crate::command::{CommandId, CommandPair};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(wire_size::<CommandPair>(MAX_PAYLOAD_SIZE)),
            config,
        }
    }

    /// Encode and send a command, truncating the payload to the limit.
    ///
    /// Returns the number of payload bytes actually sent. Callers that must
    /// not lose data should compare it with the payload length or use
    /// [`send_strict`](Self::send_strict).
    pub fn send<C: CommandId>(&mut self, command: C, payload: Option<&[u8]>) -> Result<usize> {
        self.buf.clear();
        let sent = encode_frame_limited(command, payload, self.config.capacity(), &mut self.buf);
        self.write_buffered()?;
        Ok(sent)
    }

    /// Encode and send a command, rejecting oversized payloads.
    pub fn send_strict<C: CommandId>(&mut self, command: C, payload: &[u8]) -> Result<()> {
        let max = self.config.capacity();
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }
        self.send(command, Some(payload)).map(|_| ())
    }

    /// Write a complete frame (blocking).
    pub fn write_frame<C: CommandId>(&mut self, frame: &Frame<C>) -> Result<()> {
        self.send_strict(frame.command, frame.payload.as_ref())
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<SerialStream> {
    /// Create a frame writer for `SerialStream` and apply write timeout from config.
    pub fn with_config_stream(inner: SerialStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
