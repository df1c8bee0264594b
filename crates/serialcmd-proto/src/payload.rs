//! Fixed-width payload layouts.
//!
//! All multi-byte integers are little-endian. Strings occupy a fixed-width
//! field and are padded with NUL bytes; a string that fills its field
//! exactly carries no terminator.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use serialcmd_frame::Frame;

use crate::command::{Command, NetworkState};
use crate::error::{ProtoError, Result};

/// Bytes of memory carried by one [`MemPage`].
pub const MEM_PAGE_SIZE: usize = 64;

/// Width of SSID, server address and user name fields.
pub const MAX_NETWORK_NAME_LENGTH: usize = 32;

/// Width of password fields.
pub const MAX_NETWORK_PASS_LENGTH: usize = 16;

/// Width of topic alias fields.
pub const MAX_ALIAS_NAME_LENGTH: usize = 16;

/// A fixed-size payload layout.
pub trait Payload: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the encoded layout to `dst`.
    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    /// Decode from the start of `src`. Bytes past [`Self::SIZE`] are ignored.
    fn decode(src: &[u8]) -> Result<Self>;

    fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Build a single-byte-command frame carrying this payload.
    fn to_frame(&self, command: Command) -> Result<Frame<u8>> {
        Ok(Frame::new(command.code(), self.to_bytes()?))
    }
}

fn ensure_len(src: &[u8], expected: usize) -> Result<()> {
    if src.len() < expected {
        return Err(ProtoError::Truncated {
            expected,
            actual: src.len(),
        });
    }
    Ok(())
}

fn put_str(dst: &mut BytesMut, field: &'static str, value: &str, width: usize) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(ProtoError::FieldTooLong {
            field,
            actual: bytes.len(),
            max: width,
        });
    }
    dst.put_slice(bytes);
    dst.put_bytes(0, width - bytes.len());
    Ok(())
}

fn get_str(src: &mut &[u8], field: &'static str, width: usize) -> Result<String> {
    let raw = &src[..width];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    let value = std::str::from_utf8(&raw[..end])
        .map_err(|_| ProtoError::InvalidUtf8(field))?
        .to_string();
    src.advance(width);
    Ok(value)
}

/// A window of device memory for `mem-read` / `mem-write`.
///
/// A read request carries `addr` and `count` with no data; the reply and
/// write requests carry `count` bytes of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemPage {
    pub addr: u16,
    pub count: u8,
    pub data: Vec<u8>,
}

impl MemPage {
    pub fn read_request(addr: u16, count: u8) -> Self {
        Self {
            addr,
            count,
            data: Vec::new(),
        }
    }

    /// A page holding `data`; fails if it exceeds [`MEM_PAGE_SIZE`].
    pub fn with_data(addr: u16, data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.len() > MEM_PAGE_SIZE {
            return Err(ProtoError::FieldTooLong {
                field: "block",
                actual: data.len(),
                max: MEM_PAGE_SIZE,
            });
        }
        Ok(Self {
            addr,
            count: data.len() as u8,
            data,
        })
    }
}

impl Payload for MemPage {
    const SIZE: usize = 2 + 1 + MEM_PAGE_SIZE;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if usize::from(self.count) > MEM_PAGE_SIZE || self.data.len() > MEM_PAGE_SIZE {
            return Err(ProtoError::FieldTooLong {
                field: "block",
                actual: usize::from(self.count).max(self.data.len()),
                max: MEM_PAGE_SIZE,
            });
        }
        dst.reserve(Self::SIZE);
        dst.put_u16_le(self.addr);
        dst.put_u8(self.count);
        dst.put_slice(&self.data);
        dst.put_bytes(0, MEM_PAGE_SIZE - self.data.len());
        Ok(())
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::SIZE)?;
        let addr = src.get_u16_le();
        let count = src.get_u8();
        if usize::from(count) > MEM_PAGE_SIZE {
            return Err(ProtoError::FieldTooLong {
                field: "count",
                actual: usize::from(count),
                max: MEM_PAGE_SIZE,
            });
        }
        Ok(Self {
            addr,
            count,
            data: src[..usize::from(count)].to_vec(),
        })
    }
}

/// Access point credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApInfo {
    pub ssid: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Payload for ApInfo {
    const SIZE: usize = MAX_NETWORK_NAME_LENGTH + MAX_NETWORK_PASS_LENGTH;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(Self::SIZE);
        put_str(dst, "ssid", &self.ssid, MAX_NETWORK_NAME_LENGTH)?;
        put_str(dst, "password", &self.password, MAX_NETWORK_PASS_LENGTH)
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::SIZE)?;
        Ok(Self {
            ssid: get_str(&mut src, "ssid", MAX_NETWORK_NAME_LENGTH)?,
            password: get_str(&mut src, "password", MAX_NETWORK_PASS_LENGTH)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
}

impl Payload for IpInfo {
    const SIZE: usize = 4;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&self.ip.octets());
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::SIZE)?;
        Ok(Self {
            ip: Ipv4Addr::new(src[0], src[1], src[2], src[3]),
        })
    }
}

/// Broker address and credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub addr: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Payload for ServerInfo {
    const SIZE: usize =
        MAX_NETWORK_NAME_LENGTH + 2 + MAX_NETWORK_NAME_LENGTH + MAX_NETWORK_PASS_LENGTH;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(Self::SIZE);
        put_str(dst, "addr", &self.addr, MAX_NETWORK_NAME_LENGTH)?;
        dst.put_u16_le(self.port);
        put_str(dst, "user", &self.user, MAX_NETWORK_NAME_LENGTH)?;
        put_str(dst, "password", &self.password, MAX_NETWORK_PASS_LENGTH)
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::SIZE)?;
        let addr = get_str(&mut src, "addr", MAX_NETWORK_NAME_LENGTH)?;
        let port = src.get_u16_le();
        Ok(Self {
            addr,
            port,
            user: get_str(&mut src, "user", MAX_NETWORK_NAME_LENGTH)?,
            password: get_str(&mut src, "password", MAX_NETWORK_PASS_LENGTH)?,
        })
    }
}

const _: () = assert!(<ServerInfo as Payload>::SIZE <= serialcmd_frame::MAX_PAYLOAD_SIZE);

/// Topic alias slot for `set-pub-alias` / `set-sub-alias`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AliasInfo {
    pub index: u8,
    pub alias: String,
}

impl Payload for AliasInfo {
    const SIZE: usize = 1 + MAX_ALIAS_NAME_LENGTH;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(Self::SIZE);
        dst.put_u8(self.index);
        put_str(dst, "alias", &self.alias, MAX_ALIAS_NAME_LENGTH)
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::SIZE)?;
        let index = src.get_u8();
        Ok(Self {
            index,
            alias: get_str(&mut src, "alias", MAX_ALIAS_NAME_LENGTH)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub ap: NetworkState,
    pub server: NetworkState,
}

impl Payload for ConnectionInfo {
    const SIZE: usize = 2;

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.ap as u8);
        dst.put_u8(self.server as u8);
        Ok(())
    }

    fn decode(src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::SIZE)?;
        Ok(Self {
            ap: NetworkState::try_from(src[0])?,
            server: NetworkState::try_from(src[1])?,
        })
    }
}
