/// Errors that can occur while encoding or decoding command payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    /// The payload is shorter than the layout requires.
    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A string or block does not fit its fixed-width field.
    #[error("field {field} too long ({actual} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        actual: usize,
        max: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// The command code is not part of the catalog.
    #[error("unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// The command name is not part of the catalog.
    #[error("unknown command name: {0}")]
    UnknownCommandName(String),

    /// The network state code is not recognised.
    #[error("unknown network state: {0}")]
    UnknownNetworkState(u8),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
