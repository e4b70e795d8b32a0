//! # Wire protocol
//!
//! Length-framed, type-tagged binary protocol spoken to the key-value engine.
//!
//! - [`value`]: the tagged-union [`Value`] codec (big-endian, tag-first)
//! - [`packet`]: the 7-byte [`MetaFrame`] header and async packet I/O
//!
//! A query packet carries `string(text)` followed by `list(params)`; an auth
//! packet carries `string(username)` followed by `string(password)`. The
//! helpers below build and split those payloads so client and server agree on
//! one layout.

pub mod packet;
pub mod value;

pub use packet::{
    read_packet, write_packet, MetaFrame, Packet, PacketKind, HANDSHAKE_OK, HANDSHAKE_PAYLOAD,
    MAX_PAYLOAD_LEN, META_FRAME_LEN, PROTOCOL_VERSION,
};
pub use value::Value;

use crate::error::{CacheError, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Build a query payload: `string(text) ++ list(params)`
pub fn encode_query(text: &str, params: &[Value]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    Value::from(text).encode_into(&mut buf)?;
    Value::List(params.to_vec()).encode_into(&mut buf)?;
    Ok(buf.freeze())
}

/// Split a query payload back into its text and parameters
pub fn decode_query(payload: &[u8]) -> Result<(String, Vec<Value>)> {
    let mut buf = payload;
    let text = match Value::decode(&mut buf)? {
        Value::String(text) => text,
        other => {
            return Err(CacheError::protocol(format!(
                "query text must be a string, got tag {:#04x}",
                other.tag()
            )))
        }
    };
    let params = match Value::decode(&mut buf)? {
        Value::List(params) => params,
        other => {
            return Err(CacheError::protocol(format!(
                "query params must be a list, got tag {:#04x}",
                other.tag()
            )))
        }
    };
    if buf.has_remaining() {
        return Err(CacheError::protocol("trailing bytes after query params"));
    }
    Ok((text, params))
}

/// Build an auth payload: `string(username) ++ string(password)`
pub fn encode_auth(username: &str, password: &str) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    Value::from(username).encode_into(&mut buf)?;
    Value::from(password).encode_into(&mut buf)?;
    Ok(buf.freeze())
}

/// Split an auth payload into username and password
pub fn decode_auth(payload: &[u8]) -> Result<(String, String)> {
    let mut buf = payload;
    let mut next = |field: &str| -> Result<String> {
        match Value::decode(&mut buf)? {
            Value::String(s) => Ok(s),
            _ => Err(CacheError::protocol(format!("auth {} must be a string", field))),
        }
    };
    let username = next("username")?;
    let password = next("password")?;
    if buf.has_remaining() {
        return Err(CacheError::protocol("trailing bytes after auth credentials"));
    }
    Ok((username, password))
}
