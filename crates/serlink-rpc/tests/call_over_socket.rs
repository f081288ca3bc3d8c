//! Caller and responder on two threads joined by a Unix socket pair.

#![cfg(unix)]

use std::thread;
use std::time::Duration;

use serlink_link::{Link, LinkConfig};
use serlink_rpc::{Command, CommandTable, Role, RpcConfig, RpcEndpoint, Value, WireType};
use serlink_transport::{SerialStream, SystemClock};

fn add_command() -> Command {
    Command::new(5, "add")
        .args([WireType::U16, WireType::U16])
        .returns(WireType::U16)
}

fn echo_command() -> Command {
    Command::new(8, "echo").arg(WireType::Var).returns(WireType::Var)
}

fn spawn_responder(stream: SerialStream) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let table = CommandTable::builder()
            .handle(add_command(), |args| {
                let a = args[0].as_i64()?;
                let b = args[1].as_i64()?;
                Value::from_i64(WireType::U16, a + b)
            })
            .handle(echo_command(), |args| Some(args[0].clone()))
            .build()
            .unwrap();
        let link = Link::new(stream, SystemClock::new(), LinkConfig::default()).unwrap();
        let mut ep = RpcEndpoint::new(
            link,
            table,
            RpcConfig {
                role: Role::Responder,
                ..Default::default()
            },
        );

        loop {
            match ep.poll_events_for(Duration::from_millis(50)) {
                Ok(_) => {}
                Err(e) if e.is_closed() => break,
                Err(e) => panic!("responder failed: {e}"),
            }
        }
        ep.dispatcher().stats().handled
    })
}

fn caller(stream: SerialStream) -> RpcEndpoint<SerialStream, SystemClock> {
    let table = CommandTable::builder()
        .declare(add_command())
        .declare(echo_command())
        .build()
        .unwrap();
    let link = Link::new(stream, SystemClock::new(), LinkConfig::default()).unwrap();
    RpcEndpoint::new(
        link,
        table,
        RpcConfig {
            call_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
    )
}

#[test]
fn call_returns_responder_result() {
    let (host, device) = SerialStream::pair().unwrap();
    let responder = spawn_responder(device);

    let mut ep = caller(host);
    ep.connect().unwrap();
    let result = ep.call(5, &[Value::U16(10), Value::U16(20)]).unwrap();
    assert_eq!(result, Some(Value::U16(30)));
    assert!(ep.link().is_up());

    drop(ep);
    assert_eq!(responder.join().unwrap(), 1);
}

#[test]
fn sequential_calls_wrap_sequence_numbers() {
    let (host, device) = SerialStream::pair().unwrap();
    let responder = spawn_responder(device);

    let mut ep = caller(host);
    ep.connect().unwrap();
    for i in 0..12u16 {
        let result = ep.call(5, &[Value::U16(i), Value::U16(100)]).unwrap();
        assert_eq!(result, Some(Value::U16(i + 100)));
    }
    let payload = Value::from(vec![0x7E, 0x7D, 0x00, 0xFF]);
    let echoed = ep.call(8, &[payload.clone()]).unwrap();
    assert_eq!(echoed, Some(payload));

    drop(ep);
    assert_eq!(responder.join().unwrap(), 13);
}
