use serialcmd_transport::TransportError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An outbound payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame declares more payload than the receive buffer can hold.
    #[error("declared frame length {declared} exceeds buffer capacity {max}")]
    FrameTooLarge { declared: usize, max: usize },

    /// The bytes do not form exactly one well-delimited frame.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// The frame configuration is unusable.
    #[error("invalid frame configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl From<TransportError> for FrameError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
            TransportError::Open { source, .. }
            | TransportError::LineConfig { source, .. }
            | TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. } => FrameError::Io(source),
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
