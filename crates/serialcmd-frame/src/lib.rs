//! STX/ETX command framing for byte-at-a-time serial links.
//!
//! Every message is framed as:
//! - a start sentinel (`STX`, 0x55)
//! - a command identifier (1 byte, or 2 ASCII characters)
//! - a 1-byte payload length (at most 128)
//! - the payload itself
//! - an end sentinel (`ETX`, 0xAA)
//!
//! There is no escaping; the length byte is authoritative. A frame that
//! stops arriving mid-way is abandoned once the line has been idle for the
//! stale timeout, so the parser always recovers on its own.

pub mod codec;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod interface;
pub mod parser;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode_frame, encode_frame, try_encode_frame, Frame, FrameConfig, OversizePolicy,
    TrailerPolicy, COMMAND_BUFFER_LEN, DEFAULT_STALE_TIMEOUT, ETX, MAX_PAYLOAD_SIZE, STX,
};
pub use command::{CommandId, CommandPair, MAX_COMMAND_WIDTH};
pub use dispatch::{Dispatch, Dispatcher, DispatcherBuilder, Handler};
pub use error::{FrameError, Result};
pub use interface::{FeedEvent, SerialInterface};
pub use parser::{DropReason, Feed, FrameParser, ParseState, ParserStats};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use tokio_codec::SerialCodec;
