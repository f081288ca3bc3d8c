use std::time::{Duration, Instant};

use serlink_rpc::{Command, CommandTable, RpcConfig, RpcEndpoint, Value, WireType};
use serlink_transport::{SerialStream, SystemClock};
use tracing::{debug, info};

use crate::cmd::parse::{parse_duration, parse_typed_value, parse_wire_type};
use crate::cmd::{port, CallArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_call_result, OutputFormat};

type Endpoint = RpcEndpoint<SerialStream, SystemClock>;

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let ret = args.returns.as_deref().map(parse_wire_type).transpose()?;
    let typed = args
        .args
        .iter()
        .map(|arg| parse_typed_value(arg))
        .collect::<CliResult<Vec<_>>>()?;
    let (types, values): (Vec<WireType>, Vec<Value>) = typed.into_iter().unzip();

    let table = command_table(args.cmd, types, ret)?;
    let stream = port::open(&args.port)?;
    let link = port::new_link(stream, &args.port)?;
    let mut endpoint = RpcEndpoint::new(
        link,
        table,
        RpcConfig {
            call_timeout: Some(timeout),
            ..RpcConfig::default()
        },
    );

    endpoint
        .connect()
        .map_err(|err| rpc_error("connect failed", err))?;

    let started = Instant::now();
    let result = if ret.is_some() {
        endpoint
            .call(args.cmd, &values)
            .map_err(|err| rpc_error("call failed", err))?
    } else {
        endpoint
            .send(args.cmd, &values)
            .map_err(|err| rpc_error("send failed", err))?;
        wait_acknowledged(&mut endpoint, timeout)?;
        None
    };
    let elapsed = started.elapsed();
    info!(cmd = args.cmd, elapsed_ms = elapsed.as_millis() as u64, "call complete");

    print_call_result(args.cmd, result.as_ref(), elapsed, format);

    if let Err(err) = endpoint.disconnect() {
        debug!(error = %err, "disconnect failed");
    }
    Ok(SUCCESS)
}

fn command_table(cmd: u8, args: Vec<WireType>, ret: Option<WireType>) -> CliResult<CommandTable> {
    let mut command = Command::new(cmd, format!("cmd{cmd}")).args(args);
    if let Some(ret) = ret {
        command = command.returns(ret);
    }
    CommandTable::builder()
        .declare(command)
        .build()
        .map_err(|err| rpc_error("command table", err))
}

/// Drive the link until every queued packet has been acknowledged.
fn wait_acknowledged(endpoint: &mut Endpoint, timeout: Duration) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let link = endpoint.link();
        if link.is_up() && link.unacked() == 0 && link.pending() == 0 {
            return Ok(());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("send failed: not acknowledged within {timeout:?}"),
            ));
        }
        endpoint
            .poll_events_for(remaining.min(endpoint.config().max_poll_interval))
            .map_err(|err| rpc_error("send failed", err))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_table_declares_single_command() {
        let table =
            command_table(5, vec![WireType::U16, WireType::U16], Some(WireType::U16)).unwrap();
        let command = table.get(5).unwrap();
        assert_eq!(command.args, vec![WireType::U16, WireType::U16]);
        assert_eq!(command.ret, Some(WireType::U16));
        assert!(!table.has_handler(5));
    }
}
