use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serlink_link::LinkState;
use serlink_rpc::{Command, CommandTable, Role, RpcConfig, RpcEndpoint, Value, WireType};
use serlink_transport::SerialStream;
use tracing::{info, warn};

use crate::cmd::{port, ServeArgs};
use crate::exit::{io_error, rpc_error, CliError, CliResult, INTERNAL, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const PING: u8 = 1;
pub const ADD: u8 = 5;
pub const ECHO: u8 = 8;
pub const UPTIME: u8 = 9;

enum SessionEnd {
    /// The peer went away; a socket server accepts the next connection.
    Closed,
    /// Interrupted or the requested number of commands was handled.
    Stopped,
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let started = Instant::now();
    let mut handled = 0u64;

    if !args.port.socket {
        let stream = port::open_tty(&args.port)?;
        serve_session(stream, &args, started, &running, &mut handled)?;
        return Ok(SUCCESS);
    }

    let listener = port::bind(&args.port.device)?;
    info!(path = %args.port.device.display(), "listening");
    while running.load(Ordering::SeqCst) {
        let (stream, _) = listener
            .accept()
            .map_err(|err| io_error("accept failed", err))?;
        info!("peer connected");
        let stream = SerialStream::from_unix(stream);
        match serve_session(stream, &args, started, &running, &mut handled)? {
            SessionEnd::Closed => info!("peer disconnected"),
            SessionEnd::Stopped => break,
        }
    }
    Ok(SUCCESS)
}

fn serve_session(
    stream: SerialStream,
    args: &ServeArgs,
    started: Instant,
    running: &AtomicBool,
    handled: &mut u64,
) -> CliResult<SessionEnd> {
    let link = port::new_link(stream, &args.port)?;
    let mut endpoint = RpcEndpoint::new(
        link,
        demo_table(started)?,
        RpcConfig {
            role: Role::Responder,
            ..RpcConfig::default()
        },
    );

    let mut state = endpoint.state();
    let mut session_handled = 0u64;
    while running.load(Ordering::SeqCst) {
        match endpoint.poll_events_for(POLL_INTERVAL) {
            Ok(_) => {}
            Err(err) if err.is_closed() => return Ok(SessionEnd::Closed),
            Err(err) => return Err(rpc_error("serve failed", err)),
        }

        if endpoint.state() != state {
            state = endpoint.state();
            info!(state = %state, "link state changed");
        }

        let now_handled = endpoint.dispatcher().stats().handled;
        *handled += now_handled - session_handled;
        session_handled = now_handled;
        if args.count.is_some_and(|limit| *handled >= limit) {
            drain(&mut endpoint);
            return Ok(SessionEnd::Stopped);
        }
    }

    if state == LinkState::Up {
        if let Err(err) = endpoint.disconnect() {
            warn!(error = %err, "disconnect failed");
        }
    }
    Ok(SessionEnd::Stopped)
}

/// Give queued replies a chance to be acknowledged before exiting.
fn drain(endpoint: &mut RpcEndpoint<SerialStream, serlink_transport::SystemClock>) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while endpoint.link().unacked() + endpoint.link().pending() > 0 && Instant::now() < deadline {
        if endpoint.poll_events_for(POLL_INTERVAL).is_err() {
            return;
        }
    }
}

/// Built-in commands answered by `serlink serve`.
pub fn demo_table(started: Instant) -> CliResult<CommandTable> {
    CommandTable::builder()
        .handle(
            Command::new(PING, "ping").arg(WireType::U8).returns(WireType::U8),
            |args| args.first().cloned(),
        )
        .handle(
            Command::new(ADD, "add")
                .args([WireType::U16, WireType::U16])
                .returns(WireType::U16),
            |args| match args {
                [Value::U16(a), Value::U16(b)] => Some(Value::U16(a.wrapping_add(*b))),
                _ => None,
            },
        )
        .handle(
            Command::new(ECHO, "echo").arg(WireType::Var).returns(WireType::Var),
            |args| args.first().cloned(),
        )
        .handle(
            Command::new(UPTIME, "uptime").returns(WireType::U32),
            move |_| {
                let ms = started.elapsed().as_millis();
                Some(Value::U32(u32::try_from(ms).unwrap_or(u32::MAX)))
            },
        )
        .build()
        .map_err(|err| rpc_error("command table", err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_table_serves_every_builtin() {
        let table = demo_table(Instant::now()).unwrap();
        for id in [PING, ADD, ECHO, UPTIME] {
            assert!(table.has_handler(id), "command {id} has no handler");
        }
        assert_eq!(table.len(), 4);
    }
}
