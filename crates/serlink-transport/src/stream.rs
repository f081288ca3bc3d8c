use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

const READ_CHUNK: usize = 512;

/// Line speeds accepted by [`SerialStream::open_tty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    /// Map a numeric rate to a supported line speed.
    pub fn from_u32(rate: u32) -> Result<Self> {
        match rate {
            9600 => Ok(Self::B9600),
            19200 => Ok(Self::B19200),
            38400 => Ok(Self::B38400),
            57600 => Ok(Self::B57600),
            115200 => Ok(Self::B115200),
            230400 => Ok(Self::B230400),
            other => Err(TransportError::UnsupportedBaudRate(other)),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::B9600 => 9600,
            Self::B19200 => 19200,
            Self::B38400 => 38400,
            Self::B57600 => 57600,
            Self::B115200 => 115200,
            Self::B230400 => 230400,
        }
    }

    fn speed(self) -> libc::speed_t {
        match self {
            Self::B9600 => libc::B9600,
            Self::B19200 => libc::B19200,
            Self::B38400 => libc::B38400,
            Self::B57600 => libc::B57600,
            Self::B115200 => libc::B115200,
            Self::B230400 => libc::B230400,
        }
    }
}

/// A byte stream backed by a file descriptor.
///
/// Covers the two host setups serlink runs on: a connected Unix socket
/// (loopback tests, simulators) and a raw-mode serial device.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    Unix(UnixStream),
    Tty(File),
}

impl SerialStream {
    /// Create a connected pair of socket-backed streams.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from_unix(a), Self::from_unix(b)))
    }

    /// Wrap an already-connected Unix socket.
    pub fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Unix(stream),
        }
    }

    /// Open a tty device in raw 8N1 mode at `baud`, with DTR and RTS asserted.
    pub fn open_tty(path: impl AsRef<Path>, baud: BaudRate) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        configure_raw(file.as_raw_fd(), baud).map_err(|source| TransportError::Configure {
            path: path.to_path_buf(),
            source,
        })?;

        if let Err(e) = assert_modem_lines(file.as_raw_fd()) {
            // Pseudo-terminals and some adapters have no modem lines.
            warn!(path = %path.display(), error = %e, "could not assert DTR/RTS");
        }

        info!(path = %path.display(), baud = baud.as_u32(), "opened serial device");
        Ok(Self {
            inner: SerialStreamInner::Tty(file),
        })
    }

    fn raw_fd(&self) -> RawFd {
        match &self.inner {
            SerialStreamInner::Unix(stream) => stream.as_raw_fd(),
            SerialStreamInner::Tty(file) => file.as_raw_fd(),
        }
    }

    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Unix(stream) => stream.read(buf),
            SerialStreamInner::Tty(file) => file.read(buf),
        }
    }

    /// Wait until the descriptor is readable. Returns `false` on timeout.
    fn wait_readable(&self, timeout: Option<Duration>) -> std::io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and the count passed is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, poll_timeout_ms(timeout)) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(rc > 0)
    }
}

impl Transport for SerialStream {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let result = match &mut self.inner {
            SerialStreamInner::Unix(stream) => stream.write_all(buf),
            SerialStreamInner::Tty(file) => file.write_all(buf),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(TransportError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Unix(stream) => stream.flush()?,
            SerialStreamInner::Tty(file) => file.flush()?,
        }
        Ok(())
    }

    fn poll_read(&mut self, dst: &mut BytesMut, timeout: Option<Duration>) -> Result<usize> {
        if !self.wait_readable(timeout)? {
            return Ok(0);
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.read_some(&mut chunk) {
                Ok(0) => {
                    debug!("peer closed stream");
                    return Err(TransportError::Closed);
                }
                Ok(n) => {
                    dst.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            SerialStreamInner::Unix(_) => "unix",
            SerialStreamInner::Tty(_) => "tty",
        };
        f.debug_struct("SerialStream").field("type", &kind).finish()
    }
}

/// Convert a wait bound to a `poll(2)` timeout, rounding up to whole
/// milliseconds so a pending deadline is never polled early in a tight loop.
fn poll_timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let mut ms = d.as_millis();
            if d.subsec_nanos() % 1_000_000 != 0 {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

fn configure_raw(fd: RawFd, baud: BaudRate) -> std::io::Result<()> {
    // SAFETY: termios is plain old data; tcgetattr fully initializes it
    // before any field is read.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open descriptor and `tio` is a valid writable termios.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` was initialized by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut tio) };

    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !(libc::CSTOPB | libc::PARENB | libc::CSIZE);
    tio.c_cflag |= libc::CS8;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is a valid termios and the speed constant comes from libc.
    let speed_rc = unsafe {
        libc::cfsetispeed(&mut tio, baud.speed()) | libc::cfsetospeed(&mut tio, baud.speed())
    };
    if speed_rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is an open descriptor and `tio` is a fully initialized termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is an open descriptor; flushing stale input has no memory effects.
    unsafe { libc::tcflush(fd, libc::TCIFLUSH) };
    Ok(())
}

fn assert_modem_lines(fd: RawFd) -> std::io::Result<()> {
    let bits: libc::c_int = libc::TIOCM_DTR | libc::TIOCM_RTS;
    // SAFETY: TIOCMBIS reads a single c_int through the pointer, which is valid
    // for the duration of the call.
    let rc = unsafe { libc::ioctl(fd, libc::TIOCMBIS, &bits as *const libc::c_int) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (mut a, mut b) = SerialStream::pair().unwrap();
        let mut buf = BytesMut::new();

        a.write(&[0x7E, 0xFF, 0x83, 0x7E]).unwrap();
        a.flush().unwrap();
        let n = b
            .poll_read(&mut buf, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..], &[0x7E, 0xFF, 0x83, 0x7E]);

        b.write_byte(0x55).unwrap();
        buf.clear();
        a.poll_read(&mut buf, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(&buf[..], &[0x55]);
    }

    #[test]
    fn poll_read_times_out_with_zero() {
        let (mut a, _b) = SerialStream::pair().unwrap();
        let mut buf = BytesMut::new();
        let n = a
            .poll_read(&mut buf, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn poll_read_reports_closed_peer() {
        let (mut a, b) = SerialStream::pair().unwrap();
        drop(b);
        let mut buf = BytesMut::new();
        let err = a
            .poll_read(&mut buf, Some(Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn open_tty_missing_path_is_open_error() {
        let err = SerialStream::open_tty("/nonexistent/serlink-tty", BaudRate::B115200)
            .unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn baud_rate_mapping() {
        assert_eq!(BaudRate::from_u32(115200).unwrap(), BaudRate::B115200);
        assert_eq!(BaudRate::B9600.as_u32(), 9600);
        assert!(matches!(
            BaudRate::from_u32(12345),
            Err(TransportError::UnsupportedBaudRate(12345))
        ));
    }

    #[test]
    fn poll_timeout_rounds_up() {
        assert_eq!(poll_timeout_ms(None), -1);
        assert_eq!(poll_timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(poll_timeout_ms(Some(Duration::from_micros(1500))), 2);
        assert_eq!(poll_timeout_ms(Some(Duration::from_millis(500))), 500);
    }

    #[test]
    fn debug_names_backend() {
        let (a, _b) = SerialStream::pair().unwrap();
        assert!(format!("{a:?}").contains("unix"));
    }
}
