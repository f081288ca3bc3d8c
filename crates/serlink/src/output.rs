use std::io::IsTerminal;
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serlink_frame::{Control, Frame, FrameError};
use serlink_rpc::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    command: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    elapsed_ms: u64,
}

pub fn print_call_result(cmd: u8, result: Option<&Value>, elapsed: Duration, format: OutputFormat) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                command: cmd,
                kind: result.map(value_kind),
                value: result.map(value_json),
                elapsed_ms,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "TYPE", "RESULT", "ELAPSED"])
                .add_row(vec![
                    cmd.to_string(),
                    result.map(value_kind).unwrap_or("-").to_string(),
                    result.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                    format!("{elapsed_ms}ms"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match result {
            Some(value) => println!("cmd={cmd} result={value} elapsed={elapsed_ms}ms"),
            None => println!("cmd={cmd} acknowledged elapsed={elapsed_ms}ms"),
        },
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::U8(_) => "u8",
        Value::I8(_) => "i8",
        Value::U16(_) => "u16",
        Value::I16(_) => "i16",
        Value::U32(_) => "u32",
        Value::I32(_) => "i32",
        Value::Bytes(_) => "bytes",
    }
}

fn value_json(value: &Value) -> serde_json::Value {
    match value.as_i64() {
        Some(n) => serde_json::Value::from(n),
        None => serde_json::Value::from(value.to_string()),
    }
}

/// One entry of `serlink decode` output: a frame or a rejected one.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<u8>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nr: Option<u8>,
    pub poll: bool,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecodedFrame {
    pub fn from_result(index: usize, result: &Result<Frame, FrameError>) -> Self {
        match result {
            Ok(frame) => {
                let (ns, nr, poll) = match frame.control {
                    Control::Information { ns, nr, poll } => (Some(ns), Some(nr), poll),
                    Control::Supervisory { nr, poll, .. } => (None, Some(nr), poll),
                    Control::Unnumbered { poll, .. } => (None, None, poll),
                };
                Self {
                    index,
                    address: Some(frame.address),
                    kind: frame.control.name().to_string(),
                    ns,
                    nr,
                    poll,
                    payload: hex(&frame.payload),
                    error: None,
                }
            }
            Err(err) => Self {
                index,
                address: None,
                kind: "ERROR".to_string(),
                ns: None,
                nr: None,
                poll: false,
                payload: String::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

pub fn print_decoded(frames: &[DecodedFrame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(frames).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "ADDR", "KIND", "NS", "NR", "PAYLOAD"]);
            for f in frames {
                table.add_row(vec![
                    f.index.to_string(),
                    opt_hex(f.address),
                    f.kind.clone(),
                    opt(f.ns),
                    opt(f.nr),
                    f.error.clone().unwrap_or_else(|| f.payload.clone()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for f in frames {
                match &f.error {
                    Some(error) => println!("#{} error: {error}", f.index),
                    None => println!(
                        "#{} addr={} {} ns={} nr={} payload={}",
                        f.index,
                        opt_hex(f.address),
                        f.kind,
                        opt(f.ns),
                        opt(f.nr),
                        if f.payload.is_empty() { "-" } else { &f.payload }
                    ),
                }
            }
        }
    }
}

fn opt(v: Option<u8>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn opt_hex(v: Option<u8>) -> String {
    v.map(|v| format!("0x{v:02X}"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serlink_frame::UnnumberedKind;

    #[test]
    fn decoded_information_frame_carries_sequence_numbers() {
        let frame = Frame::new(Control::information(3, 5), vec![0x05, 0xAB]);
        let out = DecodedFrame::from_result(0, &Ok(frame));
        assert_eq!(out.kind, "I");
        assert_eq!(out.ns, Some(3));
        assert_eq!(out.nr, Some(5));
        assert_eq!(out.payload, "05ab");
        assert!(out.error.is_none());
    }

    #[test]
    fn decoded_error_has_message_only() {
        let err = FrameError::CrcMismatch {
            received: 1,
            computed: 2,
        };
        let out = DecodedFrame::from_result(2, &Err(err));
        assert_eq!(out.kind, "ERROR");
        assert!(out.address.is_none());
        assert!(out.error.is_some());
    }

    #[test]
    fn json_omits_absent_fields() {
        let frame = Frame::new(Control::unnumbered(UnnumberedKind::Snrm), Vec::new());
        let out = DecodedFrame::from_result(0, &Ok(frame));
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"kind\":\"SNRM\""));
        assert!(!json.contains("\"ns\""));
        assert!(!json.contains("\"error\""));
    }
}
