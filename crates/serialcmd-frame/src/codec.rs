use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::command::CommandId;
use crate::error::{FrameError, Result};

/// Start-of-frame sentinel.
pub const STX: u8 = 0x55;

/// End-of-frame sentinel.
pub const ETX: u8 = 0xAA;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 128;

/// Capacity of the parser's receive buffer.
pub const COMMAND_BUFFER_LEN: usize = 128;

/// Idle time after which a half-received frame is abandoned.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_millis(10);

/// A complete command message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<C> {
    /// The command this message carries.
    pub command: C,
    /// The message payload (at most [`MAX_PAYLOAD_SIZE`] bytes).
    pub payload: Bytes,
}

impl<C: CommandId> Frame<C> {
    /// Create a new frame.
    pub fn new(command: C, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (sentinels + header + payload).
    pub fn wire_size(&self) -> usize {
        wire_size::<C>(self.payload.len())
    }
}

/// Wire size of a frame carrying `payload_len` bytes.
pub const fn wire_size<C: CommandId>(payload_len: usize) -> usize {
    // STX + command + LEN + payload + ETX
    1 + C::WIDTH + 1 + payload_len + 1
}

/// Encode a frame into the wire format, truncating oversized payloads.
///
/// Wire format:
/// ```text
/// ┌──────┬─────────────┬─────────┬──────────────────┬──────┐
/// │ STX  │ Command     │ Length  │ Payload          │ ETX  │
/// │ 0x55 │ (1B or 2B)  │ (1B)    │ (Length bytes)   │ 0xAA │
/// └──────┴─────────────┴─────────┴──────────────────┴──────┘
/// ```
///
/// Payload bytes beyond [`MAX_PAYLOAD_SIZE`] are dropped. `None` encodes an
/// empty payload. Returns the number of payload bytes actually encoded.
pub fn encode_frame<C: CommandId>(command: C, payload: Option<&[u8]>, dst: &mut BytesMut) -> usize {
    encode_frame_limited(command, payload, MAX_PAYLOAD_SIZE, dst)
}

/// Encode a frame, rejecting payloads larger than [`MAX_PAYLOAD_SIZE`].
pub fn try_encode_frame<C: CommandId>(
    command: C,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    encode_frame_limited(command, Some(payload), MAX_PAYLOAD_SIZE, dst);
    Ok(())
}

pub(crate) fn encode_frame_limited<C: CommandId>(
    command: C,
    payload: Option<&[u8]>,
    limit: usize,
    dst: &mut BytesMut,
) -> usize {
    let payload = payload.unwrap_or_default();
    let limit = limit.min(MAX_PAYLOAD_SIZE);
    let len = payload.len().min(limit);
    if len < payload.len() {
        warn!(
            command = ?command,
            size = payload.len(),
            max = limit,
            "payload truncated to fit frame"
        );
    }

    dst.reserve(wire_size::<C>(len));
    dst.put_u8(STX);
    dst.put_slice(&command.to_wire()[..C::WIDTH]);
    // `len` is at most MAX_PAYLOAD_SIZE, which fits in the length byte.
    dst.put_u8(len as u8);
    dst.put_slice(&payload[..len]);
    dst.put_u8(ETX);
    len
}

/// Decode exactly one complete frame from `src`.
///
/// Unlike [`FrameParser`](crate::FrameParser) this is strict: leading
/// garbage, trailing bytes or a missing sentinel are all errors.
pub fn decode_frame<C: CommandId>(src: &[u8]) -> Result<Frame<C>> {
    let (&start, rest) = src
        .split_first()
        .ok_or(FrameError::Malformed("empty input"))?;
    if start != STX {
        return Err(FrameError::Malformed("missing start sentinel"));
    }
    if rest.len() < C::WIDTH + 2 {
        return Err(FrameError::Malformed("truncated header"));
    }

    let mut raw = [0u8; crate::command::MAX_COMMAND_WIDTH];
    raw[..C::WIDTH].copy_from_slice(&rest[..C::WIDTH]);
    let command = C::from_wire(raw);

    let declared = usize::from(rest[C::WIDTH]);
    if declared > MAX_PAYLOAD_SIZE {
        return Err(FrameError::FrameTooLarge {
            declared,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let body = &rest[C::WIDTH + 1..];
    match body.len().cmp(&(declared + 1)) {
        std::cmp::Ordering::Less => return Err(FrameError::Malformed("truncated payload")),
        std::cmp::Ordering::Greater => return Err(FrameError::Malformed("trailing bytes")),
        std::cmp::Ordering::Equal => {}
    }
    if body[declared] != ETX {
        return Err(FrameError::Malformed("missing end sentinel"));
    }

    Ok(Frame::new(command, Bytes::copy_from_slice(&body[..declared])))
}

/// What the parser does with a declared length larger than its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Abandon the frame and wait for the next STX.
    #[default]
    Reject,
    /// Collect only as many bytes as fit, then expect ETX.
    Clamp,
}

/// What the parser does with a byte other than ETX/STX after the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailerPolicy {
    /// Abandon the frame and wait for the next STX.
    #[default]
    Abort,
    /// Ignore the byte and keep waiting for ETX (until the stale timeout).
    Wait,
}

/// Configuration for framing on a link.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 128.
    pub max_payload_size: usize,
    /// Idle gap that abandons a partial frame. Default: 10 ms.
    pub stale_timeout: Duration,
    /// Handling of declared lengths above `max_payload_size`.
    pub oversize_policy: OversizePolicy,
    /// Handling of unexpected bytes where ETX belongs.
    pub trailer_policy: TrailerPolicy,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl FrameConfig {
    /// Check that the configuration fits the fixed receive buffer.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size > COMMAND_BUFFER_LEN {
            return Err(FrameError::InvalidConfig(format!(
                "max_payload_size {} exceeds buffer capacity {COMMAND_BUFFER_LEN}",
                self.max_payload_size
            )));
        }
        if self.stale_timeout.is_zero() {
            return Err(FrameError::InvalidConfig(
                "stale_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective payload capacity, never larger than the receive buffer.
    pub fn capacity(&self) -> usize {
        self.max_payload_size.min(COMMAND_BUFFER_LEN)
    }

    pub(crate) fn stale_timeout_ms(&self) -> u64 {
        u64::try_from(self.stale_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            oversize_policy: OversizePolicy::default(),
            trailer_policy: TrailerPolicy::default(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandPair;

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        let written = encode_frame(0x02u8, Some(b"hi"), &mut buf);

        assert_eq!(written, 2);
        assert_eq!(buf.as_ref(), &[STX, 0x02, 2, b'h', b'i', ETX]);
    }

    #[test]
    fn test_encode_without_payload() {
        let mut buf = BytesMut::new();
        let written = encode_frame(0x06u8, None, &mut buf);

        assert_eq!(written, 0);
        assert_eq!(buf.as_ref(), &[STX, 0x06, 0, ETX]);
    }

    #[test]
    fn test_encode_two_character_command() {
        let mut buf = BytesMut::new();
        encode_frame(CommandPair::new(b'v', b'r'), Some(&[1]), &mut buf);
        assert_eq!(buf.as_ref(), &[STX, b'V', b'R', 1, 1, ETX]);
    }

    #[test]
    fn test_encode_truncates_oversized_payload() {
        let payload: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
        let mut buf = BytesMut::new();
        let written = encode_frame(0x04u8, Some(&payload), &mut buf);

        assert_eq!(written, MAX_PAYLOAD_SIZE);
        assert_eq!(buf.len(), wire_size::<u8>(MAX_PAYLOAD_SIZE));

        let frame: Frame<u8> = decode_frame(&buf).unwrap();
        assert_eq!(frame.payload.as_ref(), &payload[..MAX_PAYLOAD_SIZE]);
    }

    #[test]
    fn test_try_encode_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let err = try_encode_frame(0x04u8, &[0u8; MAX_PAYLOAD_SIZE + 1], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 129, max: 128 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_payload_may_contain_sentinels() {
        let payload = [ETX, STX, ETX];
        let mut buf = BytesMut::new();
        try_encode_frame(0x11u8, &payload, &mut buf).unwrap();

        let frame: Frame<u8> = decode_frame(&buf).unwrap();
        assert_eq!(frame.command, 0x11);
        assert_eq!(frame.payload.as_ref(), &payload);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_frame::<u8>(&[]),
            Err(FrameError::Malformed("empty input"))
        ));
        assert!(matches!(
            decode_frame::<u8>(&[0x00, 0x01, 0x00, ETX]),
            Err(FrameError::Malformed("missing start sentinel"))
        ));
        assert!(matches!(
            decode_frame::<u8>(&[STX, 0x01]),
            Err(FrameError::Malformed("truncated header"))
        ));
        assert!(matches!(
            decode_frame::<u8>(&[STX, 0x01, 2, 0xAB, ETX]),
            Err(FrameError::Malformed("truncated payload"))
        ));
        assert!(matches!(
            decode_frame::<u8>(&[STX, 0x01, 0, 0x00]),
            Err(FrameError::Malformed("missing end sentinel"))
        ));
        assert!(matches!(
            decode_frame::<u8>(&[STX, 0x01, 0, ETX, 0x00]),
            Err(FrameError::Malformed("trailing bytes"))
        ));
        assert!(matches!(
            decode_frame::<u8>(&[STX, 0x01, 200, ETX]),
            Err(FrameError::FrameTooLarge { declared: 200, .. })
        ));
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(0x01u8, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), 8);

        let pair = Frame::new(CommandPair::new(b'A', b'B'), Bytes::new());
        assert_eq!(pair.wire_size(), 5);
    }

    #[test]
    fn test_config_validation() {
        assert!(FrameConfig::default().validate().is_ok());

        let too_big = FrameConfig {
            max_payload_size: COMMAND_BUFFER_LEN + 1,
            ..FrameConfig::default()
        };
        assert!(matches!(too_big.validate(), Err(FrameError::InvalidConfig(_))));
        assert_eq!(too_big.capacity(), COMMAND_BUFFER_LEN);

        let zero_timeout = FrameConfig {
            stale_timeout: Duration::ZERO,
            ..FrameConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
    }
}
