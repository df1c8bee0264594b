//! `tokio_util::codec` adapter for async serial links.

use bytes::{Buf, BytesMut};
use serialcmd_transport::Clock;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame_limited, Frame, FrameConfig};
use crate::command::CommandId;
use crate::error::{FrameError, Result};
use crate::parser::{Feed, FrameParser};

/// Frame codec for `FramedRead`/`FramedWrite`.
///
/// Decoding drives the same byte-at-a-time [`FrameParser`] as the blocking
/// reader, so stale-frame recovery behaves identically.
pub struct SerialCodec<C, K> {
    parser: FrameParser<C, K>,
}

impl<C: CommandId, K: Clock> SerialCodec<C, K> {
    pub fn new(clock: K) -> Self {
        Self::with_config(clock, FrameConfig::default())
    }

    pub fn with_config(clock: K, config: FrameConfig) -> Self {
        Self {
            parser: FrameParser::with_config(clock, config),
        }
    }

    pub fn parser(&self) -> &FrameParser<C, K> {
        &self.parser
    }
}

impl<C: CommandId, K: Clock> Decoder for SerialCodec<C, K> {
    type Item = Frame<C>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while src.has_remaining() {
            if let Feed::Complete(frame) = self.parser.feed(src.get_u8()) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl<C: CommandId, K: Clock> Encoder<Frame<C>> for SerialCodec<C, K> {
    type Error = FrameError;

    fn encode(&mut self, item: Frame<C>, dst: &mut BytesMut) -> Result<()> {
        let max = self.parser.config().capacity();
        if item.payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max,
            });
        }
        encode_frame_limited(item.command, Some(item.payload.as_ref()), max, dst);
        Ok(())
    }
}
