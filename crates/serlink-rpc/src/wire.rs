//! Typed argument marshaling.
//!
//! Integers are big-endian. A fixed buffer is written as-is; a variable
//! buffer is preceded by its length as a big-endian `u32`.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Wire type of a single argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    /// Opaque buffer of exactly this many bytes.
    Fixed(usize),
    /// Opaque buffer with a 32-bit length prefix.
    Var,
}

impl WireType {
    /// Encoded size, if it does not depend on the value.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            WireType::U8 | WireType::I8 => Some(1),
            WireType::U16 | WireType::I16 => Some(2),
            WireType::U32 | WireType::I32 => Some(4),
            WireType::Fixed(n) => Some(n),
            WireType::Var => None,
        }
    }

    /// Parse a type name as used on the command line
    /// (`u8`, `i16`, `var`, `fixed:16`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "u8" => Some(WireType::U8),
            "i8" => Some(WireType::I8),
            "u16" => Some(WireType::U16),
            "i16" => Some(WireType::I16),
            "u32" => Some(WireType::U32),
            "i32" => Some(WireType::I32),
            "var" => Some(WireType::Var),
            other => other
                .strip_prefix("fixed:")
                .and_then(|n| n.parse().ok())
                .map(WireType::Fixed),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireType::U8 => f.write_str("u8"),
            WireType::I8 => f.write_str("i8"),
            WireType::U16 => f.write_str("u16"),
            WireType::I16 => f.write_str("i16"),
            WireType::U32 => f.write_str("u32"),
            WireType::I32 => f.write_str("i32"),
            WireType::Fixed(n) => write!(f, "fixed:{n}"),
            WireType::Var => f.write_str("var"),
        }
    }
}

/// A decoded argument or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    Bytes(Bytes),
}

impl Value {
    /// Widen any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Build a value of type `ty` from an integer, checking its range.
    pub fn from_i64(ty: WireType, v: i64) -> Option<Self> {
        match ty {
            WireType::U8 => u8::try_from(v).ok().map(Value::U8),
            WireType::I8 => i8::try_from(v).ok().map(Value::I8),
            WireType::U16 => u16::try_from(v).ok().map(Value::U16),
            WireType::I16 => i16::try_from(v).ok().map(Value::I16),
            WireType::U32 => u32::try_from(v).ok().map(Value::U32),
            WireType::I32 => i32::try_from(v).ok().map(Value::I32),
            WireType::Fixed(_) | WireType::Var => None,
        }
    }

    fn matches(&self, ty: WireType) -> bool {
        matches!(
            (self, ty),
            (Value::U8(_), WireType::U8)
                | (Value::I8(_), WireType::I8)
                | (Value::U16(_), WireType::U16)
                | (Value::I16(_), WireType::I16)
                | (Value::U32(_), WireType::U32)
                | (Value::I32(_), WireType::I32)
                | (Value::Bytes(_), WireType::Var)
        ) || matches!((self, ty), (Value::Bytes(b), WireType::Fixed(n)) if b.len() == n)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::I8(_) => "i8",
            Value::U16(_) => "u16",
            Value::I16(_) => "i16",
            Value::U32(_) => "u32",
            Value::I32(_) => "i32",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(b) => {
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            other => match other.as_i64() {
                Some(v) => write!(f, "{v}"),
                None => Ok(()),
            },
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from!(u8 => U8, i8 => I8, u16 => U16, i16 => I16, u32 => U32, i32 => I32, Bytes => Bytes);

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

/// Errors that can occur while marshaling values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The payload ended before every argument was read.
    #[error("truncated payload (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// Bytes were left after the last argument.
    #[error("{0} trailing bytes after last argument")]
    TrailingBytes(usize),

    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("argument {index}: expected {expected}, got {got}")]
    TypeMismatch {
        index: usize,
        expected: WireType,
        got: &'static str,
    },

    /// A variable buffer longer than the length prefix can express.
    #[error("buffer too long ({0} bytes)")]
    TooLong(usize),
}

pub type Result<T> = std::result::Result<T, WireError>;

fn take(src: &mut &[u8], n: usize) -> Result<Bytes> {
    if src.len() < n {
        return Err(WireError::Truncated {
            needed: n,
            available: src.len(),
        });
    }
    let out = Bytes::copy_from_slice(&src[..n]);
    src.advance(n);
    Ok(out)
}

fn need(src: &[u8], n: usize) -> Result<()> {
    if src.len() < n {
        return Err(WireError::Truncated {
            needed: n,
            available: src.len(),
        });
    }
    Ok(())
}

/// Read one value of type `ty` from the front of `src`.
pub fn read_value(ty: WireType, src: &mut &[u8]) -> Result<Value> {
    if let Some(n) = ty.fixed_size() {
        need(src, n)?;
    }
    Ok(match ty {
        WireType::U8 => Value::U8(src.get_u8()),
        WireType::I8 => Value::I8(src.get_i8()),
        WireType::U16 => Value::U16(src.get_u16()),
        WireType::I16 => Value::I16(src.get_i16()),
        WireType::U32 => Value::U32(src.get_u32()),
        WireType::I32 => Value::I32(src.get_i32()),
        WireType::Fixed(n) => Value::Bytes(take(src, n)?),
        WireType::Var => {
            need(src, 4)?;
            let len = src.get_u32() as usize;
            Value::Bytes(take(src, len)?)
        }
    })
}

/// Append `value` encoded as `ty`.
pub fn write_value(ty: WireType, value: &Value, dst: &mut BytesMut) -> Result<()> {
    if !value.matches(ty) {
        return Err(WireError::TypeMismatch {
            index: 0,
            expected: ty,
            got: value.kind(),
        });
    }
    match value {
        Value::U8(v) => dst.put_u8(*v),
        Value::I8(v) => dst.put_i8(*v),
        Value::U16(v) => dst.put_u16(*v),
        Value::I16(v) => dst.put_i16(*v),
        Value::U32(v) => dst.put_u32(*v),
        Value::I32(v) => dst.put_i32(*v),
        Value::Bytes(b) => {
            if ty == WireType::Var {
                let len = u32::try_from(b.len()).map_err(|_| WireError::TooLong(b.len()))?;
                dst.put_u32(len);
            }
            dst.put_slice(b);
        }
    }
    Ok(())
}

/// Decode a full argument list. The payload must be consumed exactly.
pub fn decode_args(types: &[WireType], payload: &[u8]) -> Result<Vec<Value>> {
    let mut src = payload;
    let values = types
        .iter()
        .map(|&ty| read_value(ty, &mut src))
        .collect::<Result<Vec<_>>>()?;
    if !src.is_empty() {
        return Err(WireError::TrailingBytes(src.len()));
    }
    Ok(values)
}

/// Encode an argument list.
pub fn encode_args(types: &[WireType], values: &[Value], dst: &mut BytesMut) -> Result<()> {
    if types.len() != values.len() {
        return Err(WireError::ArgumentCount {
            expected: types.len(),
            got: values.len(),
        });
    }
    for (index, (&ty, value)) in types.iter().zip(values).enumerate() {
        write_value(ty, value, dst).map_err(|e| match e {
            WireError::TypeMismatch { expected, got, .. } => WireError::TypeMismatch {
                index,
                expected,
                got,
            },
            other => other,
        })?;
    }
    Ok(())
}

/// Decode a single value occupying the whole payload.
pub fn decode_value(ty: WireType, payload: &[u8]) -> Result<Value> {
    let mut src = payload;
    let value = read_value(ty, &mut src)?;
    if !src.is_empty() {
        return Err(WireError::TrailingBytes(src.len()));
    }
    Ok(value)
}

/// Incremental packet construction: a command id followed by raw appends.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    buf: BytesMut,
}

impl PacketBuilder {
    pub fn new(command: u8) -> Self {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(command);
        Self { buf }
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.put_u8(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.put_u16(v);
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.put_u32(v);
        self
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.put_slice(v);
        self
    }

    /// Append a value with its wire encoding.
    pub fn value(mut self, ty: WireType, v: &Value) -> Result<Self> {
        write_value(ty, v, &mut self.buf)?;
        Ok(self)
    }

    /// Bytes appended so far, command id included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
