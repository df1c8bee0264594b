//! Byte-stream transports and time sources.
//!
//! The framing layer only needs three collaborators: a byte source, a byte
//! sink and a monotonic millisecond clock. This crate provides them:
//! - [`SerialStream`]: a `Read + Write` stream over a tty device, a plain
//!   file/FIFO, or a Unix domain socket (for simulated links)
//! - [`Clock`]: the time source used for stale-frame detection
//!
//! Everything else builds on top of these.

pub mod clock;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod tty;
#[cfg(unix)]
pub mod uds;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{Result, TransportError};
pub use traits::{LineConfig, SerialStream, DEFAULT_BAUD};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
