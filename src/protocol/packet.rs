//! Packet framing: a fixed 7-byte meta frame followed by the payload
//!
//! ```text
//! +---------+------+-------+--------------------+-------------------+
//! | version | kind | flags | payload_length(BE) | payload bytes ... |
//! |   u8    |  u8  |  u8   |        u32         |  payload_length   |
//! +---------+------+-------+--------------------+-------------------+
//! ```

use crate::error::{CacheError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version written into every meta frame
pub const PROTOCOL_VERSION: u8 = 2;

/// Size of the meta frame on the wire
pub const META_FRAME_LEN: usize = 7;

/// Largest payload a peer may declare
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// Client handshake payload
pub const HANDSHAKE_PAYLOAD: &[u8] = b"SKYHASH2.0\n";

/// The only acceptable handshake reply payload
pub const HANDSHAKE_OK: &[u8] = b"OK\n";

/// Packet kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Query,
    Response,
    Auth,
    Handshake,
}

impl PacketKind {
    pub const fn to_u8(self) -> u8 {
        match self {
            PacketKind::Query => 1,
            PacketKind::Response => 2,
            PacketKind::Auth => 3,
            PacketKind::Handshake => 4,
        }
    }

    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(PacketKind::Query),
            2 => Ok(PacketKind::Response),
            3 => Ok(PacketKind::Auth),
            4 => Ok(PacketKind::Handshake),
            other => Err(CacheError::protocol(format!(
                "unknown packet kind {:#04x}",
                other
            ))),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Query => write!(f, "query"),
            PacketKind::Response => write!(f, "response"),
            PacketKind::Auth => write!(f, "auth"),
            PacketKind::Handshake => write!(f, "handshake"),
        }
    }
}

/// Fixed packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaFrame {
    pub version: u8,
    pub kind: PacketKind,
    pub flags: u8,
    pub payload_length: u32,
}

impl MetaFrame {
    pub fn new(kind: PacketKind, flags: u8, payload_length: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            flags,
            payload_length,
        }
    }

    pub fn encode(&self) -> [u8; META_FRAME_LEN] {
        let mut out = [0u8; META_FRAME_LEN];
        out[0] = self.version;
        out[1] = self.kind.to_u8();
        out[2] = self.flags;
        out[3..7].copy_from_slice(&self.payload_length.to_be_bytes());
        out
    }

    /// Decode and validate a meta frame
    ///
    /// Rejects a foreign version, an unknown kind and a payload length above
    /// [`MAX_PAYLOAD_LEN`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < META_FRAME_LEN {
            return Err(CacheError::protocol(format!(
                "meta frame needs {} bytes, got {}",
                META_FRAME_LEN,
                bytes.len()
            )));
        }
        let mut buf = &bytes[..META_FRAME_LEN];
        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(CacheError::protocol(format!(
                "unsupported protocol version {}",
                version
            )));
        }
        let kind = PacketKind::from_u8(buf.get_u8())?;
        let flags = buf.get_u8();
        let payload_length = buf.get_u32();
        if payload_length > MAX_PAYLOAD_LEN {
            return Err(CacheError::protocol(format!(
                "payload length {} exceeds limit {}",
                payload_length, MAX_PAYLOAD_LEN
            )));
        }
        Ok(Self {
            version,
            kind,
            flags,
            payload_length,
        })
    }
}

/// A framed packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub flags: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(kind: PacketKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            flags: 0,
            payload: payload.into(),
        }
    }

    pub fn handshake() -> Self {
        Self::new(PacketKind::Handshake, Bytes::from_static(HANDSHAKE_PAYLOAD))
    }

    pub fn meta(&self) -> Result<MetaFrame> {
        let len = u32::try_from(self.payload.len())
            .ok()
            .filter(|len| *len <= MAX_PAYLOAD_LEN)
            .ok_or_else(|| {
                CacheError::protocol(format!(
                    "payload of {} bytes cannot be framed",
                    self.payload.len()
                ))
            })?;
        Ok(MetaFrame::new(self.kind, self.flags, len))
    }

    /// Meta frame plus payload as one contiguous buffer
    pub fn encode(&self) -> Result<BytesMut> {
        let meta = self.meta()?;
        let mut buf = BytesMut::with_capacity(META_FRAME_LEN + self.payload.len());
        buf.put_slice(&meta.encode());
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decode one packet that occupies the whole of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let meta = MetaFrame::decode(bytes)?;
        let body = &bytes[META_FRAME_LEN..];
        if body.len() != meta.payload_length as usize {
            return Err(CacheError::protocol(format!(
                "declared payload length {} but {} bytes follow",
                meta.payload_length,
                body.len()
            )));
        }
        Ok(Self {
            kind: meta.kind,
            flags: meta.flags,
            payload: Bytes::copy_from_slice(body),
        })
    }
}

/// Write one packet and flush
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = packet.encode()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one packet
///
/// The payload is read only after the meta frame validated, so a hostile
/// length never drives an allocation past [`MAX_PAYLOAD_LEN`].
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; META_FRAME_LEN];
    reader.read_exact(&mut header).await.map_err(eof_as_connection)?;
    let meta = MetaFrame::decode(&header)?;

    let mut payload = vec![0u8; meta.payload_length as usize];
    reader.read_exact(&mut payload).await.map_err(eof_as_connection)?;

    Ok(Packet {
        kind: meta.kind,
        flags: meta.flags,
        payload: Bytes::from(payload),
    })
}

fn eof_as_connection(e: std::io::Error) -> CacheError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        CacheError::ConnectionError("peer closed the connection mid-packet".to_string())
    } else {
        CacheError::Io(e)
    }
}
