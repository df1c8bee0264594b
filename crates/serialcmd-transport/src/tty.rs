//! Raw-mode line setup for tty devices.

use std::os::fd::AsRawFd;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::LineConfig;

/// Returns true if the file refers to a terminal device.
pub fn is_terminal(file: &std::fs::File) -> bool {
    // SAFETY: `isatty` only inspects the descriptor, which `file` keeps open.
    unsafe { libc::isatty(file.as_raw_fd()) == 1 }
}

/// Map a numeric baud rate to its termios speed constant.
pub fn speed_for_baud(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

/// Switch a tty to raw 8N1 at `line.baud`.
///
/// Reads return after the first byte or after `line.read_timeout` (in
/// tenths of a second, capped at 25.5 s) when nothing arrives.
pub fn configure_raw(file: &std::fs::File, line: &LineConfig) -> Result<()> {
    let speed = speed_for_baud(line.baud).ok_or(TransportError::UnsupportedBaud(line.baud))?;
    let fd = file.as_raw_fd();

    // SAFETY: zeroed termios is a valid out-parameter for tcgetattr.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open tty descriptor and `tio` is a valid termios.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    // SAFETY: `tio` was initialised by tcgetattr above.
    unsafe {
        libc::cfmakeraw(&mut tio);
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }

    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = vtime_for(line.read_timeout);

    // SAFETY: `fd` is an open tty descriptor and `tio` is fully initialised.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    debug!(baud = line.baud, vtime = tio.c_cc[libc::VTIME], "tty switched to raw mode");
    Ok(())
}

fn vtime_for(timeout: Option<std::time::Duration>) -> libc::cc_t {
    match timeout {
        // VMIN=0/VTIME=0 would poll; block in 25.5 s slices instead.
        None => libc::cc_t::MAX,
        Some(timeout) => {
            let tenths = timeout.as_millis().div_ceil(100).max(1);
            libc::cc_t::try_from(tenths).unwrap_or(libc::cc_t::MAX)
        }
    }
}
