use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::SerialStream;

/// Unix domain socket standing in for a UART link.
///
/// One side binds (usually a device simulator), the other connects as if it
/// were opening a serial port. The socket file is removed on drop.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixDomainSocket {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A stale socket at `path` is removed first; any other kind of file
    /// at that path is left alone and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(TransportError::Bind {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|source| TransportError::Bind {
                path: path.clone(),
                source,
            })?;
        }

        let listener = UnixListener::bind(&path).map_err(|source| TransportError::Bind {
            path: path.clone(),
            source,
        })?;

        info!(?path, "listening on unix domain socket");
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<SerialStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!("accepted connection");
        Ok(SerialStream::from_unix(stream))
    }

    /// Switch the listener between blocking and polling accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(TransportError::Accept)
    }

    /// Accept a pending connection without waiting.
    ///
    /// Returns `Ok(None)` when the listener is non-blocking and nobody is
    /// connecting. Accepted streams are always blocking.
    pub fn try_accept(&self) -> Result<Option<SerialStream>> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(false).map_err(TransportError::Accept)?;
                debug!("accepted connection");
                Ok(Some(SerialStream::from_unix(stream)))
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<SerialStream> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            TransportError::Connect {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(SerialStream::from_unix(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::traits::LineConfig;

    fn unique_sock_path(tag: &str) -> PathBuf {
        PathBuf::from(format!(
            "/tmp/serialcmd-uds-{tag}-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn bind_connect_exchange_bytes() {
        let path = unique_sock_path("exchange");
        let listener = UnixDomainSocket::bind(&path).unwrap();

        let client_path = path.clone();
        let client = std::thread::spawn(move || {
            let mut stream = UnixDomainSocket::connect(&client_path).unwrap();
            stream.write_all(&[0x55, 0x02, 0x00, 0xAA]).unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x55, 0x02, 0x00, 0xAA]);
        client.join().unwrap();
    }

    #[test]
    fn open_detects_socket_paths() {
        let path = unique_sock_path("detect");
        let _listener = UnixDomainSocket::bind(&path).unwrap();

        let stream = SerialStream::open(&path, &LineConfig::default()).unwrap();
        assert_eq!(stream.kind(), "unix");
    }

    #[test]
    fn bind_refuses_to_replace_regular_file() {
        let path = unique_sock_path("regular");
        std::fs::write(&path, b"not a socket").unwrap();

        let err = UnixDomainSocket::bind(&path).err().unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn bind_rejects_long_paths() {
        let path = PathBuf::from(format!("/tmp/{}", "x".repeat(200)));
        let err = UnixDomainSocket::bind(&path).err().unwrap();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }

    #[test]
    fn nonblocking_accept_polls_until_a_client_connects() {
        let path = unique_sock_path("poll");
        let listener = UnixDomainSocket::bind(&path).unwrap();
        listener.set_nonblocking(true).unwrap();
        assert!(listener.try_accept().unwrap().is_none());

        let mut client = UnixDomainSocket::connect(&path).unwrap();
        client.write_all(&[0x55, 0x1A, 0x00, 0xAA]).unwrap();

        let mut server = listener.try_accept().unwrap().unwrap();
        server
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x55, 0x1A, 0x00, 0xAA]);
    }

    #[test]
    fn socket_file_removed_on_drop() {
        let path = unique_sock_path("drop");
        let listener = UnixDomainSocket::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
        drop(listener);
        assert!(!path.exists());
    }
}
