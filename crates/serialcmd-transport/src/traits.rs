use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, TransportError};

/// Default line speed for tty devices.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Line settings applied when a tty device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Line speed in bits per second.
    pub baud: u32,
    /// How long a blocking read waits for the first byte. `None` blocks forever.
    pub read_timeout: Option<Duration>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            read_timeout: Some(Duration::from_millis(100)),
        }
    }
}

/// A connected serial byte stream (`Read + Write`).
///
/// Wraps either a device node (tty, FIFO, plain file) or a Unix domain
/// socket standing in for a UART link.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    Device(std::fs::File),
    /// A raw-mode terminal; a zero-length read means the VTIME timeout fired.
    #[cfg(unix)]
    Tty(std::fs::File),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Device(file) => file.read(buf),
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => match file.read(buf)? {
                0 if !buf.is_empty() => Err(std::io::ErrorKind::TimedOut.into()),
                n => Ok(n),
            },
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Device(file) => file.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => file.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialStreamInner::Device(file) => file.flush(),
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => file.flush(),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    /// Open a serial target.
    ///
    /// Unix socket paths are connected to; anything else is opened read/write
    /// as a device node. Terminal devices are switched to raw mode at the
    /// configured baud rate.
    pub fn open(path: impl AsRef<Path>, line: &LineConfig) -> Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let is_socket = std::fs::metadata(path)
                .map(|meta| meta.file_type().is_socket())
                .unwrap_or(false);
            if is_socket {
                let stream = crate::uds::UnixDomainSocket::connect(path)?;
                stream.set_read_timeout(line.read_timeout)?;
                return Ok(stream);
            }
        }

        Self::open_device(path, line)
    }

    /// Open a device node without socket detection.
    pub fn open_device(path: impl AsRef<Path>, line: &LineConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = open_read_write(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        #[cfg(unix)]
        {
            if crate::tty::is_terminal(&file) {
                crate::tty::configure_raw(&file, line).map_err(|err| match err {
                    TransportError::Io(source) => TransportError::LineConfig {
                        path: path.to_path_buf(),
                        source,
                    },
                    other => other,
                })?;
                info!(?path, baud = line.baud, "opened tty device");
                return Ok(Self {
                    inner: SerialStreamInner::Tty(file),
                });
            }
            info!(?path, "opened non-tty device; line settings skipped");
        }
        #[cfg(not(unix))]
        info!(?path, "opened device");

        Ok(Self {
            inner: SerialStreamInner::Device(file),
        })
    }

    /// Create a SerialStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Device nodes take their timeout from [`LineConfig`] at open time, so
    /// this is a no-op for them. A tty read that times out reports
    /// `ErrorKind::TimedOut`.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            SerialStreamInner::Device(_) => Ok(()),
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => Ok(()),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream (sockets only).
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            SerialStreamInner::Device(_) => Ok(()),
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => Ok(()),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to split a link into an independent reader and writer.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            SerialStreamInner::Device(file) => SerialStreamInner::Device(file.try_clone()?),
            #[cfg(unix)]
            SerialStreamInner::Tty(file) => SerialStreamInner::Tty(file.try_clone()?),
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => SerialStreamInner::Unix(stream.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Short description of the stream kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            SerialStreamInner::Device(_) => "device",
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => "tty",
            #[cfg(unix)]
            SerialStreamInner::Unix(_) => "unix",
        }
    }
}

fn open_read_write(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.read(true).write(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        // A serial port must not become our controlling terminal.
        options.custom_flags(libc::O_NOCTTY);
    }

    options.open(path)
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("type", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "serialcmd-transport-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn open_plain_file_as_device() {
        let path = unique_temp_path("file");
        std::fs::write(&path, [0x55, 0x01, 0x00, 0xAA]).unwrap();

        let mut stream = SerialStream::open(&path, &LineConfig::default()).unwrap();
        assert_eq!(stream.kind(), "device");

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![0x55, 0x01, 0x00, 0xAA]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_missing_path_reports_path() {
        let path = unique_temp_path("missing");
        let err = SerialStream::open(&path, &LineConfig::default()).unwrap_err();
        match err {
            TransportError::Open { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn device_timeouts_are_accepted() {
        let path = unique_temp_path("timeouts");
        std::fs::write(&path, b"").unwrap();

        let stream = SerialStream::open_device(&path, &LineConfig::default()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(5)))
            .unwrap();
        stream.set_write_timeout(None).unwrap();
        let clone = stream.try_clone().unwrap();
        assert_eq!(clone.kind(), "device");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn default_line_config() {
        let line = LineConfig::default();
        assert_eq!(line.baud, DEFAULT_BAUD);
        assert_eq!(line.read_timeout, Some(Duration::from_millis(100)));
    }
}
