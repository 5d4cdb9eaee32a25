//! Length-prefixed frame codec.
//!
//! Every frame begins with a fixed 24-byte prefix followed by a meta section
//! and the opaque body:
//!
//! ```text
//! Byte/     0       |       1       |       2       |       3       |
//!   +---------------+---------------+---------------+---------------+
//!  0| Magic "PLXC"                                                  |
//!   +---------------+---------------+---------------+---------------+
//!  4| Total length (prefix + meta + body)                           |
//!   +---------------+---------------+---------------+---------------+
//!  8| Header length (prefix + meta)                                 |
//!   +---------------+---------------+---------------+---------------+
//! 12| CRC32 of the meta section                                     |
//!   +---------------+---------------+---------------+---------------+
//! 16| CRC32 of the body                                             |
//!   +---------------+---------------+---------------+---------------+
//! 20| Header version                                                |
//!   +---------------+---------------+---------------+---------------+
//! 24| Meta section ...                                              |
//!   | Body ...                                                      |
//! ```
//!
//! All integers are big-endian. The meta section differs by direction:
//!
//! ```text
//! Request : seq_id u64 | trace_id u64 | timeout_ms u32 |
//!           app_id i32 | partition_index i32 | op_len u16 | op_code
//! Response: seq_id u64 | trace_id u64 | error i32 | op_len u16 | op_code
//! ```

use crate::base::Gpid;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Frame magic, first four bytes of every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"PLXC";

/// Current header version.
pub const HEADER_VERSION: u32 = 1;

/// Length of the fixed prefix before the meta section.
pub const FIXED_PREFIX_LEN: usize = 24;

/// Default frame size limit.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 << 20;

/// Frame decode and encode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    /// The first four bytes are not the frame magic.
    #[error("bad frame magic")]
    BadMagic,

    /// Declared lengths are inconsistent with the received bytes.
    #[error("truncated frame")]
    ShortRead,

    /// A checksum over the meta section or body did not match.
    #[error("frame checksum mismatch")]
    BadCrc,

    /// The declared total length exceeds the configured limit.
    #[error("frame exceeds size limit of {0} bytes")]
    OversizedFrame(usize),
}

/// A request frame as written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Per-session sequence id.
    pub seq_id: u64,
    /// Trace id carried through retries for correlation in logs.
    pub trace_id: u64,
    /// Remaining client budget for this attempt, milliseconds.
    pub timeout_ms: u32,
    /// Target partition.
    pub gpid: Gpid,
    /// ASCII operation code.
    pub op_code: String,
    /// Opaque serialized request body.
    pub body: Bytes,
}

/// A response frame as read by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Sequence id echoed from the request.
    pub seq_id: u64,
    /// Trace id echoed from the request.
    pub trace_id: u64,
    /// Server error code; zero is success.
    pub error: i32,
    /// ASCII operation code echoed from the request.
    pub op_code: String,
    /// Opaque serialized response body.
    pub body: Bytes,
}

fn put_prefix(out: &mut BytesMut, meta: &[u8], body: &[u8]) {
    let header_len = FIXED_PREFIX_LEN + meta.len();
    let total_len = header_len + body.len();
    out.put_slice(&FRAME_MAGIC);
    out.put_u32(total_len as u32);
    out.put_u32(header_len as u32);
    out.put_u32(crc32fast::hash(meta));
    out.put_u32(crc32fast::hash(body));
    out.put_u32(HEADER_VERSION);
    out.put_slice(meta);
    out.put_slice(body);
}

/// Encode a request frame.
pub fn encode_request(frame: &RequestFrame) -> Bytes {
    let mut meta = BytesMut::with_capacity(30 + frame.op_code.len());
    meta.put_u64(frame.seq_id);
    meta.put_u64(frame.trace_id);
    meta.put_u32(frame.timeout_ms);
    meta.put_i32(frame.gpid.app_id);
    meta.put_i32(frame.gpid.partition_index);
    meta.put_u16(frame.op_code.len() as u16);
    meta.put_slice(frame.op_code.as_bytes());

    let mut out = BytesMut::with_capacity(FIXED_PREFIX_LEN + meta.len() + frame.body.len());
    put_prefix(&mut out, &meta, &frame.body);
    out.freeze()
}

/// Encode a response frame.
pub fn encode_response(frame: &ResponseFrame) -> Bytes {
    let mut meta = BytesMut::with_capacity(22 + frame.op_code.len());
    meta.put_u64(frame.seq_id);
    meta.put_u64(frame.trace_id);
    meta.put_i32(frame.error);
    meta.put_u16(frame.op_code.len() as u16);
    meta.put_slice(frame.op_code.as_bytes());

    let mut out = BytesMut::with_capacity(FIXED_PREFIX_LEN + meta.len() + frame.body.len());
    put_prefix(&mut out, &meta, &frame.body);
    out.freeze()
}

/// Outcome of splitting one frame off the front of a read buffer: the meta
/// section and body, already checksum-verified.
struct RawFrame {
    meta: Bytes,
    body: Bytes,
}

/// Try to split one whole frame off `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. On success the frame's
/// bytes are consumed from `buf`.
fn split_frame(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<RawFrame>, FramingError> {
    if buf.len() < FIXED_PREFIX_LEN {
        return Ok(None);
    }
    if buf[0..4] != FRAME_MAGIC {
        return Err(FramingError::BadMagic);
    }
    let total_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    let header_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
    let header_crc = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
    let body_crc = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);

    if total_len > max_frame_size {
        return Err(FramingError::OversizedFrame(max_frame_size));
    }
    if header_len < FIXED_PREFIX_LEN || header_len > total_len {
        return Err(FramingError::ShortRead);
    }
    if buf.len() < total_len {
        return Ok(None);
    }

    let mut frame = buf.split_to(total_len).freeze();
    frame.advance(FIXED_PREFIX_LEN);
    let meta = frame.split_to(header_len - FIXED_PREFIX_LEN);
    let body = frame;

    if crc32fast::hash(&meta) != header_crc || crc32fast::hash(&body) != body_crc {
        return Err(FramingError::BadCrc);
    }
    Ok(Some(RawFrame { meta, body }))
}

fn read_op_code(meta: &mut Bytes) -> Result<String, FramingError> {
    if meta.remaining() < 2 {
        return Err(FramingError::ShortRead);
    }
    let op_len = meta.get_u16() as usize;
    if meta.remaining() < op_len {
        return Err(FramingError::ShortRead);
    }
    let op = meta.split_to(op_len);
    String::from_utf8(op.to_vec()).map_err(|_| FramingError::ShortRead)
}

/// Try to decode one request frame from `buf` (server side of the protocol).
///
/// Returns `Ok(None)` when more bytes are needed.
pub fn decode_request(
    buf: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<RequestFrame>, FramingError> {
    let Some(raw) = split_frame(buf, max_frame_size)? else {
        return Ok(None);
    };
    let mut meta = raw.meta;
    if meta.remaining() < 28 {
        return Err(FramingError::ShortRead);
    }
    let seq_id = meta.get_u64();
    let trace_id = meta.get_u64();
    let timeout_ms = meta.get_u32();
    let app_id = meta.get_i32();
    let partition_index = meta.get_i32();
    let op_code = read_op_code(&mut meta)?;
    Ok(Some(RequestFrame {
        seq_id,
        trace_id,
        timeout_ms,
        gpid: Gpid::new(app_id, partition_index),
        op_code,
        body: raw.body,
    }))
}

/// Try to decode one response frame from `buf` (client side of the protocol).
///
/// Returns `Ok(None)` when more bytes are needed.
pub fn decode_response(
    buf: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<ResponseFrame>, FramingError> {
    let Some(raw) = split_frame(buf, max_frame_size)? else {
        return Ok(None);
    };
    let mut meta = raw.meta;
    if meta.remaining() < 20 {
        return Err(FramingError::ShortRead);
    }
    let seq_id = meta.get_u64();
    let trace_id = meta.get_u64();
    let error = meta.get_i32();
    let op_code = read_op_code(&mut meta)?;
    Ok(Some(ResponseFrame {
        seq_id,
        trace_id,
        error,
        op_code,
        body: raw.body,
    }))
}
