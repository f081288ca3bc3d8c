use std::time::Duration;

use serlink_rpc::{Value, WireType};

use crate::exit::{CliError, CliResult};

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn parse_wire_type(input: &str) -> CliResult<WireType> {
    WireType::parse(input).ok_or_else(|| CliError::usage(format!("unknown type: {input}")))
}

/// Parse a `TYPE:VALUE` argument. `str:` is accepted as a UTF-8 spelling
/// of `var`.
pub fn parse_typed_value(input: &str) -> CliResult<(WireType, Value)> {
    if let Some(text) = input.strip_prefix("str:") {
        return Ok((WireType::Var, Value::from(text.as_bytes())));
    }

    let (ty, raw) = input
        .rsplit_once(':')
        .ok_or_else(|| CliError::usage(format!("argument must be TYPE:VALUE: {input}")))?;

    let ty = parse_wire_type(ty)?;
    let value = match ty {
        WireType::Var => Value::from(parse_hex(raw)?),
        WireType::Fixed(n) => {
            let bytes = parse_hex(raw)?;
            if bytes.len() != n {
                return Err(CliError::usage(format!(
                    "{input}: expected {n} bytes, got {}",
                    bytes.len()
                )));
            }
            Value::from(bytes)
        }
        _ => {
            let n = parse_int(raw)?;
            Value::from_i64(ty, n)
                .ok_or_else(|| CliError::usage(format!("{raw} out of range for {ty}")))?
        }
    };
    Ok((ty, value))
}

fn parse_int(raw: &str) -> CliResult<i64> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    let n = parsed.map_err(|_| CliError::usage(format!("invalid integer: {raw}")))?;
    Ok(if negative { -n } else { n })
}

/// Decode a hex string, ignoring whitespace.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::usage("hex input has an odd number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_digit(pair[0]);
            let lo = hex_digit(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(CliError::usage(format!(
                    "invalid hex byte: {}",
                    String::from_utf8_lossy(pair)
                ))),
            }
        })
        .collect()
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}
