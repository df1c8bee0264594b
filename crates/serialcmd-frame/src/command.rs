//! Command identifiers.
//!
//! Two incompatible wire layouts exist for the command field:
//! - a single numeric byte (`u8`)
//! - a two-character ASCII code such as `"VR"` ([`CommandPair`])
//!
//! The parser, encoder and dispatcher are generic over [`CommandId`], so the
//! layout is picked once by choosing the type parameter.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Widest command field supported on the wire.
pub const MAX_COMMAND_WIDTH: usize = 2;

/// A command identifier with a fixed on-wire width.
pub trait CommandId: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Number of bytes the identifier occupies on the wire (1..=2).
    const WIDTH: usize;

    /// Build an identifier from the first `WIDTH` bytes of `raw`.
    fn from_wire(raw: [u8; MAX_COMMAND_WIDTH]) -> Self;

    /// Wire bytes; only the first `WIDTH` are transmitted.
    fn to_wire(self) -> [u8; MAX_COMMAND_WIDTH];
}

impl CommandId for u8 {
    const WIDTH: usize = 1;

    fn from_wire(raw: [u8; MAX_COMMAND_WIDTH]) -> Self {
        raw[0]
    }

    fn to_wire(self) -> [u8; MAX_COMMAND_WIDTH] {
        [self, 0]
    }
}

/// Two-character command code, case-insensitive.
///
/// ASCII letters are upper-cased on construction, so `"vr"` and `"VR"`
/// name the same command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandPair([u8; 2]);

impl CommandPair {
    pub const fn new(first: u8, second: u8) -> Self {
        Self([first.to_ascii_uppercase(), second.to_ascii_uppercase()])
    }

    /// Build from two ASCII characters. Returns `None` for non-ASCII input.
    pub fn from_chars(first: char, second: char) -> Option<Self> {
        let first = u8::try_from(first).ok().filter(u8::is_ascii)?;
        let second = u8::try_from(second).ok().filter(u8::is_ascii)?;
        Some(Self::new(first, second))
    }

    pub const fn first(self) -> u8 {
        self.0[0]
    }

    pub const fn second(self) -> u8 {
        self.0[1]
    }
}

impl CommandId for CommandPair {
    const WIDTH: usize = 2;

    fn from_wire(raw: [u8; MAX_COMMAND_WIDTH]) -> Self {
        Self::new(raw[0], raw[1])
    }

    fn to_wire(self) -> [u8; MAX_COMMAND_WIDTH] {
        self.0
    }
}

impl fmt::Display for CommandPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(u8::is_ascii_graphic) {
            write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
        } else {
            write!(f, "0x{:02X}{:02X}", self.0[0], self.0[1])
        }
    }
}

impl FromStr for CommandPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(first), Some(second), None) => Self::from_chars(first, second)
                .ok_or_else(|| format!("command code must be ASCII: {s:?}")),
            _ => Err(format!("command code must be exactly two characters: {s:?}")),
        }
    }
}
