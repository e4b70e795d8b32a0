//! Tagged-union wire values
//!
//! Every value starts with a one-byte tag. Multi-byte integers are big-endian.
//! Decoded strings, binaries and lists own their storage; nothing borrows from
//! the input buffer.

use crate::error::{CacheError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Maximum list nesting accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

pub const TAG_NULL: u8 = 0x00;
pub const TAG_BOOL: u8 = 0x01;
pub const TAG_UINT8: u8 = 0x02;
pub const TAG_UINT16: u8 = 0x03;
pub const TAG_UINT32: u8 = 0x04;
pub const TAG_UINT64: u8 = 0x05;
pub const TAG_SINT8: u8 = 0x06;
pub const TAG_SINT16: u8 = 0x07;
pub const TAG_SINT32: u8 = 0x08;
pub const TAG_SINT64: u8 = 0x09;
pub const TAG_FLOAT32: u8 = 0x0A;
pub const TAG_FLOAT64: u8 = 0x0B;
pub const TAG_BINARY: u8 = 0x10;
pub const TAG_STRING: u8 = 0x11;
pub const TAG_LIST: u8 = 0x20;
pub const TAG_RESPONSE_CODE: u8 = 0xF0;
pub const TAG_ERROR_CODE: u8 = 0xF1;

/// A single protocol value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    SInt8(i8),
    SInt16(i16),
    SInt32(i32),
    SInt64(i64),
    Float32(f32),
    Float64(f64),
    Binary(Vec<u8>),
    String(String),
    List(Vec<Value>),
    /// Status code returned by the engine (0 = ok)
    ResponseCode(u16),
    /// Failure code plus a human-readable message
    ErrorCode { code: u16, message: String },
}

impl Value {
    /// The wire tag for this variant
    pub fn tag(&self) -> u8 {
        match self {
            Value::Null => TAG_NULL,
            Value::Bool(_) => TAG_BOOL,
            Value::UInt8(_) => TAG_UINT8,
            Value::UInt16(_) => TAG_UINT16,
            Value::UInt32(_) => TAG_UINT32,
            Value::UInt64(_) => TAG_UINT64,
            Value::SInt8(_) => TAG_SINT8,
            Value::SInt16(_) => TAG_SINT16,
            Value::SInt32(_) => TAG_SINT32,
            Value::SInt64(_) => TAG_SINT64,
            Value::Float32(_) => TAG_FLOAT32,
            Value::Float64(_) => TAG_FLOAT64,
            Value::Binary(_) => TAG_BINARY,
            Value::String(_) => TAG_STRING,
            Value::List(_) => TAG_LIST,
            Value::ResponseCode(_) => TAG_RESPONSE_CODE,
            Value::ErrorCode { .. } => TAG_ERROR_CODE,
        }
    }

    /// Encode into a fresh buffer
    pub fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Append the encoded value to `buf`
    ///
    /// Fails only when a length does not fit the 4-byte length prefix.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.tag());
        match self {
            Value::Null => {}
            Value::Bool(b) => buf.put_u8(u8::from(*b)),
            Value::UInt8(v) => buf.put_u8(*v),
            Value::UInt16(v) => buf.put_u16(*v),
            Value::UInt32(v) => buf.put_u32(*v),
            Value::UInt64(v) => buf.put_u64(*v),
            Value::SInt8(v) => buf.put_i8(*v),
            Value::SInt16(v) => buf.put_i16(*v),
            Value::SInt32(v) => buf.put_i32(*v),
            Value::SInt64(v) => buf.put_i64(*v),
            Value::Float32(v) => buf.put_f32(*v),
            Value::Float64(v) => buf.put_f64(*v),
            Value::Binary(bytes) => {
                buf.put_u32(wire_len(bytes.len(), "binary")?);
                buf.put_slice(bytes);
            }
            Value::String(s) => {
                buf.put_u32(wire_len(s.len(), "string")?);
                buf.put_slice(s.as_bytes());
            }
            Value::List(items) => {
                buf.put_u32(wire_len(items.len(), "list")?);
                for item in items {
                    item.encode_into(buf)?;
                }
            }
            Value::ResponseCode(code) => buf.put_u16(*code),
            Value::ErrorCode { code, message } => {
                buf.put_u16(*code);
                buf.put_u32(wire_len(message.len(), "error message")?);
                buf.put_slice(message.as_bytes());
            }
        }
        Ok(())
    }

    /// Decode exactly one value from the front of `buf`, advancing it
    pub fn decode(buf: &mut impl Buf) -> Result<Value> {
        decode_at_depth(buf, 0)
    }

    /// Decode a buffer that must contain exactly one value
    pub fn decode_exact(bytes: &[u8]) -> Result<Value> {
        let mut buf = bytes;
        let value = Value::decode(&mut buf)?;
        if buf.has_remaining() {
            return Err(CacheError::protocol(format!(
                "{} trailing bytes after value",
                buf.remaining()
            )));
        }
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::SInt64(v)
    }
}

fn wire_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| CacheError::protocol(format!("{} length {} exceeds u32", what, len)))
}

fn need(buf: &impl Buf, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(CacheError::protocol(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_bytes(buf: &mut impl Buf, what: &str) -> Result<Vec<u8>> {
    need(buf, 4, what)?;
    let len = buf.get_u32() as usize;
    need(buf, len, what)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn read_string(buf: &mut impl Buf, what: &str) -> Result<String> {
    let bytes = read_bytes(buf, what)?;
    String::from_utf8(bytes)
        .map_err(|e| CacheError::protocol(format!("{} is not valid UTF-8: {}", what, e)))
}

fn decode_at_depth(buf: &mut impl Buf, depth: usize) -> Result<Value> {
    need(buf, 1, "value tag")?;
    let tag = buf.get_u8();
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => {
            need(buf, 1, "bool")?;
            match buf.get_u8() {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(CacheError::protocol(format!("invalid bool byte {:#04x}", other)))
                }
            }
        }
        TAG_UINT8 => {
            need(buf, 1, "uint8")?;
            Value::UInt8(buf.get_u8())
        }
        TAG_UINT16 => {
            need(buf, 2, "uint16")?;
            Value::UInt16(buf.get_u16())
        }
        TAG_UINT32 => {
            need(buf, 4, "uint32")?;
            Value::UInt32(buf.get_u32())
        }
        TAG_UINT64 => {
            need(buf, 8, "uint64")?;
            Value::UInt64(buf.get_u64())
        }
        TAG_SINT8 => {
            need(buf, 1, "sint8")?;
            Value::SInt8(buf.get_i8())
        }
        TAG_SINT16 => {
            need(buf, 2, "sint16")?;
            Value::SInt16(buf.get_i16())
        }
        TAG_SINT32 => {
            need(buf, 4, "sint32")?;
            Value::SInt32(buf.get_i32())
        }
        TAG_SINT64 => {
            need(buf, 8, "sint64")?;
            Value::SInt64(buf.get_i64())
        }
        TAG_FLOAT32 => {
            need(buf, 4, "float32")?;
            Value::Float32(buf.get_f32())
        }
        TAG_FLOAT64 => {
            need(buf, 8, "float64")?;
            Value::Float64(buf.get_f64())
        }
        TAG_BINARY => Value::Binary(read_bytes(buf, "binary")?),
        TAG_STRING => Value::String(read_string(buf, "string")?),
        TAG_LIST => {
            if depth >= MAX_NESTING_DEPTH {
                return Err(CacheError::protocol(format!(
                    "list nesting exceeds {} levels",
                    MAX_NESTING_DEPTH
                )));
            }
            need(buf, 4, "list count")?;
            let count = buf.get_u32() as usize;
            // every element needs at least its tag byte
            need(buf, count, "list elements")?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_at_depth(buf, depth + 1)?);
            }
            Value::List(items)
        }
        TAG_RESPONSE_CODE => {
            need(buf, 2, "response code")?;
            Value::ResponseCode(buf.get_u16())
        }
        TAG_ERROR_CODE => {
            need(buf, 2, "error code")?;
            let code = buf.get_u16();
            let message = read_string(buf, "error message")?;
            Value::ErrorCode { code, message }
        }
        other => {
            return Err(CacheError::protocol(format!(
                "unknown value tag {:#04x}",
                other
            )))
        }
    };
    Ok(value)
}
