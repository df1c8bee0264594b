//! Application protocol carried over serialcmd frames.
//!
//! The framing layer treats the command byte and payload as opaque. This
//! crate gives them meaning for the network bridge firmware: the
//! [`Command`] catalog and the fixed little-endian payload layouts each
//! command exchanges.

pub mod command;
pub mod error;
pub mod payload;

pub use command::{Command, NetworkState};
pub use error::{ProtoError, Result};
pub use payload::{
    AliasInfo, ApInfo, ConnectionInfo, IpInfo, MemPage, Payload, ServerInfo, MAX_ALIAS_NAME_LENGTH,
    MAX_NETWORK_NAME_LENGTH, MAX_NETWORK_PASS_LENGTH, MEM_PAGE_SIZE,
};
