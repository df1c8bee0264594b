//! STX/ETX command framing and dispatch for serial links.
//!
//! serialcmd moves short command messages over a byte-at-a-time link such
//! as a UART: a start sentinel, a command identifier, a length byte, the
//! payload and an end sentinel. Receivers recover from noise and stalled
//! frames on their own and route each frame to a per-command handler.
//!
//! # Crate Structure
//!
//! - [`transport`]: tty devices, Unix sockets and clocks
//! - [`frame`]: the frame parser, encoder, dispatcher and link interface
//! - [`proto`]: the command catalog and payload layouts of the network bridge

/// Re-export transport types.
pub mod transport {
    pub use serialcmd_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialcmd_frame::*;
}

/// Re-export protocol types.
pub mod proto {
    pub use serialcmd_proto::*;
}
