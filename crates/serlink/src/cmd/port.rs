use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use serlink_frame::FrameConfig;
use serlink_link::{Link, LinkConfig};
use serlink_transport::{BaudRate, SerialStream, SystemClock};

use crate::cmd::PortArgs;
use crate::exit::{io_error, link_error, transport_error, CliResult};

pub type PortLink = Link<SerialStream, SystemClock>;

pub fn link_config(port: &PortArgs) -> LinkConfig {
    LinkConfig {
        allowed_packets_in_transit: port.window,
        frame: FrameConfig {
            escape_control_chars: port.escape_low,
            ..FrameConfig::default()
        },
        ..LinkConfig::default()
    }
}

pub fn new_link(stream: SerialStream, port: &PortArgs) -> CliResult<PortLink> {
    Link::new(stream, SystemClock::new(), link_config(port))
        .map_err(|err| link_error("link setup failed", err))
}

/// Open the station end that initiates: a tty, or a connection to a
/// listening socket.
pub fn open(port: &PortArgs) -> CliResult<SerialStream> {
    if port.socket {
        let stream = UnixStream::connect(&port.device).map_err(|err| {
            io_error(&format!("connect to {} failed", port.device.display()), err)
        })?;
        return Ok(SerialStream::from_unix(stream));
    }
    open_tty(port)
}

pub fn open_tty(port: &PortArgs) -> CliResult<SerialStream> {
    let baud = BaudRate::from_u32(port.baud).map_err(|err| transport_error("invalid --baud", err))?;
    SerialStream::open_tty(&port.device, baud).map_err(|err| transport_error("open failed", err))
}

/// Bind a listening socket, replacing a stale socket file left by an
/// earlier run. Any other file at `path` is an error.
pub fn bind(path: &Path) -> CliResult<UnixListener> {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_socket() {
            std::fs::remove_file(path)
                .map_err(|err| io_error(&format!("remove {} failed", path.display()), err))?;
        }
    }
    UnixListener::bind(path).map_err(|err| io_error(&format!("bind {} failed", path.display()), err))
}
