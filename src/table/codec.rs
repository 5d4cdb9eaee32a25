//! Request and response body layouts per operation kind.
//!
//! Bodies are opaque to the routing engine; these are the layouts the data
//! operations in [`crate::table::api`] speak. Everything is big-endian and
//! length-prefixed: hash keys with a `u16`, sort keys and values with a
//! `u32`. Both directions of every layout are here so test servers can
//! decode what the client sends.

use crate::core::error::{ClientError, ClientResult};
use crate::rpc::frame::FramingError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest hash key, bound by its `u16` length prefix.
pub const MAX_HASH_KEY_LEN: usize = u16::MAX as usize;

fn check_hash_key(hash_key: &[u8], required: bool) -> ClientResult<()> {
    if required && hash_key.is_empty() {
        return Err(ClientError::InvalidArgument(
            "hash key must not be empty".into(),
        ));
    }
    if hash_key.len() > MAX_HASH_KEY_LEN {
        return Err(ClientError::InvalidArgument(format!(
            "hash key length {} exceeds {MAX_HASH_KEY_LEN}",
            hash_key.len()
        )));
    }
    Ok(())
}

fn put_hash_key(out: &mut BytesMut, hash_key: &[u8]) {
    out.put_u16(hash_key.len() as u16);
    out.put_slice(hash_key);
}

fn get_hash_key(body: &mut Bytes) -> ClientResult<Bytes> {
    if body.remaining() < 2 {
        return Err(FramingError::ShortRead.into());
    }
    let len = body.get_u16() as usize;
    if body.remaining() < len {
        return Err(FramingError::ShortRead.into());
    }
    Ok(body.split_to(len))
}

fn put_blob(out: &mut BytesMut, blob: &[u8]) {
    out.put_u32(blob.len() as u32);
    out.put_slice(blob);
}

fn get_blob(body: &mut Bytes) -> ClientResult<Bytes> {
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    let len = body.get_u32() as usize;
    if body.remaining() < len {
        return Err(FramingError::ShortRead.into());
    }
    Ok(body.split_to(len))
}

// ---------------------------------------------------------------------------
// Single-key operations: the key blob is the hash key then the sort key.
// ---------------------------------------------------------------------------

/// Encode the `(hash_key, sort_key)` pair addressed by single-key ops.
pub fn encode_key(hash_key: &[u8], sort_key: &[u8]) -> ClientResult<Bytes> {
    check_hash_key(hash_key, false)?;
    let mut out = BytesMut::with_capacity(2 + hash_key.len() + 4 + sort_key.len());
    put_hash_key(&mut out, hash_key);
    put_blob(&mut out, sort_key);
    Ok(out.freeze())
}

/// Decode a key blob into `(hash_key, sort_key)`.
pub fn decode_key(mut body: Bytes) -> ClientResult<(Bytes, Bytes)> {
    let hash_key = get_hash_key(&mut body)?;
    let sort_key = get_blob(&mut body)?;
    Ok((hash_key, sort_key))
}

/// `get` request: the key blob.
pub fn encode_get_request(hash_key: &[u8], sort_key: &[u8]) -> ClientResult<Bytes> {
    encode_key(hash_key, sort_key)
}

/// `get` response: found flag, then the value when found.
pub fn encode_get_response(value: Option<&[u8]>) -> Bytes {
    let mut out = BytesMut::new();
    match value {
        Some(v) => {
            out.put_u8(1);
            out.put_slice(v);
        }
        None => out.put_u8(0),
    }
    out.freeze()
}

/// Decode a `get` response.
pub fn decode_get_response(mut body: Bytes) -> ClientResult<Option<Bytes>> {
    if body.remaining() < 1 {
        return Err(FramingError::ShortRead.into());
    }
    match body.get_u8() {
        0 => Ok(None),
        _ => Ok(Some(body)),
    }
}

/// `put` request: key blob, value, expiry in seconds (zero = no expiry).
pub fn encode_put_request(
    hash_key: &[u8],
    sort_key: &[u8],
    value: &[u8],
    ttl_seconds: i32,
) -> ClientResult<Bytes> {
    check_hash_key(hash_key, false)?;
    let mut out = BytesMut::new();
    put_hash_key(&mut out, hash_key);
    put_blob(&mut out, sort_key);
    put_blob(&mut out, value);
    out.put_i32(ttl_seconds);
    Ok(out.freeze())
}

/// Decode a `put` request into `(hash_key, sort_key, value, ttl_seconds)`.
pub fn decode_put_request(mut body: Bytes) -> ClientResult<(Bytes, Bytes, Bytes, i32)> {
    let hash_key = get_hash_key(&mut body)?;
    let sort_key = get_blob(&mut body)?;
    let value = get_blob(&mut body)?;
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    Ok((hash_key, sort_key, value, body.get_i32()))
}

/// `remove` request: the key blob.
pub fn encode_remove_request(hash_key: &[u8], sort_key: &[u8]) -> ClientResult<Bytes> {
    encode_key(hash_key, sort_key)
}

/// `incr` request: key blob plus the signed increment.
pub fn encode_incr_request(
    hash_key: &[u8],
    sort_key: &[u8],
    increment: i64,
) -> ClientResult<Bytes> {
    let mut out = BytesMut::from(&encode_key(hash_key, sort_key)?[..]);
    out.put_i64(increment);
    Ok(out.freeze())
}

/// Decode an `incr` request into `(hash_key, sort_key, increment)`.
pub fn decode_incr_request(mut body: Bytes) -> ClientResult<(Bytes, Bytes, i64)> {
    let hash_key = get_hash_key(&mut body)?;
    let sort_key = get_blob(&mut body)?;
    if body.remaining() < 8 {
        return Err(FramingError::ShortRead.into());
    }
    Ok((hash_key, sort_key, body.get_i64()))
}

/// `incr` response: the new value.
pub fn encode_incr_response(new_value: i64) -> Bytes {
    let mut out = BytesMut::with_capacity(8);
    out.put_i64(new_value);
    out.freeze()
}

/// Decode an `incr` response.
pub fn decode_incr_response(mut body: Bytes) -> ClientResult<i64> {
    if body.remaining() < 8 {
        return Err(FramingError::ShortRead.into());
    }
    Ok(body.get_i64())
}

/// `ttl` response: found flag plus remaining seconds (negative = no expiry).
pub fn encode_ttl_response(ttl_seconds: Option<i32>) -> Bytes {
    let mut out = BytesMut::with_capacity(5);
    match ttl_seconds {
        Some(ttl) => {
            out.put_u8(1);
            out.put_i32(ttl);
        }
        None => {
            out.put_u8(0);
            out.put_i32(0);
        }
    }
    out.freeze()
}

/// Decode a `ttl` response; `None` means the key does not exist.
pub fn decode_ttl_response(mut body: Bytes) -> ClientResult<Option<i32>> {
    if body.remaining() < 5 {
        return Err(FramingError::ShortRead.into());
    }
    let found = body.get_u8() != 0;
    let ttl = body.get_i32();
    Ok(found.then_some(ttl))
}

// ---------------------------------------------------------------------------
// Multi-key operations: one hash key, many sort keys.
// ---------------------------------------------------------------------------

/// `multi_get` request: hash key, wanted sort keys (empty = all), result cap.
pub fn encode_multi_get_request(
    hash_key: &[u8],
    sort_keys: &[&[u8]],
    max_kv_count: i32,
) -> ClientResult<Bytes> {
    check_hash_key(hash_key, true)?;
    let mut out = BytesMut::new();
    put_hash_key(&mut out, hash_key);
    out.put_u32(sort_keys.len() as u32);
    for sort_key in sort_keys {
        put_blob(&mut out, sort_key);
    }
    out.put_i32(max_kv_count);
    Ok(out.freeze())
}

/// Decode a `multi_get` request into `(hash_key, sort_keys, max_kv_count)`.
pub fn decode_multi_get_request(mut body: Bytes) -> ClientResult<(Bytes, Vec<Bytes>, i32)> {
    let hash_key = get_hash_key(&mut body)?;
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    let count = body.get_u32() as usize;
    let mut sort_keys = Vec::with_capacity(count);
    for _ in 0..count {
        sort_keys.push(get_blob(&mut body)?);
    }
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    Ok((hash_key, sort_keys, body.get_i32()))
}

/// `multi_get` response: complete flag plus `(sort_key, value)` pairs.
pub fn encode_multi_get_response(all_fetched: bool, pairs: &[(Bytes, Bytes)]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u8(u8::from(all_fetched));
    out.put_u32(pairs.len() as u32);
    for (sort_key, value) in pairs {
        put_blob(&mut out, sort_key);
        put_blob(&mut out, value);
    }
    out.freeze()
}

/// Decode a `multi_get` response into `(all_fetched, pairs)`.
pub fn decode_multi_get_response(mut body: Bytes) -> ClientResult<(bool, Vec<(Bytes, Bytes)>)> {
    if body.remaining() < 5 {
        return Err(FramingError::ShortRead.into());
    }
    let all_fetched = body.get_u8() != 0;
    let count = body.get_u32() as usize;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let sort_key = get_blob(&mut body)?;
        let value = get_blob(&mut body)?;
        pairs.push((sort_key, value));
    }
    Ok((all_fetched, pairs))
}

/// `multi_put` request: hash key, `(sort_key, value)` pairs, expiry.
pub fn encode_multi_put_request(
    hash_key: &[u8],
    pairs: &[(&[u8], &[u8])],
    ttl_seconds: i32,
) -> ClientResult<Bytes> {
    check_hash_key(hash_key, true)?;
    if pairs.is_empty() {
        return Err(ClientError::InvalidArgument(
            "multi_put requires at least one pair".into(),
        ));
    }
    let mut out = BytesMut::new();
    put_hash_key(&mut out, hash_key);
    out.put_u32(pairs.len() as u32);
    for (sort_key, value) in pairs {
        put_blob(&mut out, sort_key);
        put_blob(&mut out, value);
    }
    out.put_i32(ttl_seconds);
    Ok(out.freeze())
}

/// Decode a `multi_put` request into `(hash_key, pairs, ttl_seconds)`.
pub fn decode_multi_put_request(
    mut body: Bytes,
) -> ClientResult<(Bytes, Vec<(Bytes, Bytes)>, i32)> {
    let hash_key = get_hash_key(&mut body)?;
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    let count = body.get_u32() as usize;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let sort_key = get_blob(&mut body)?;
        let value = get_blob(&mut body)?;
        pairs.push((sort_key, value));
    }
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    Ok((hash_key, pairs, body.get_i32()))
}

/// `multi_remove` request: hash key plus the sort keys to drop.
pub fn encode_multi_remove_request(hash_key: &[u8], sort_keys: &[&[u8]]) -> ClientResult<Bytes> {
    check_hash_key(hash_key, true)?;
    if sort_keys.is_empty() {
        return Err(ClientError::InvalidArgument(
            "multi_remove requires at least one sort key".into(),
        ));
    }
    let mut out = BytesMut::new();
    put_hash_key(&mut out, hash_key);
    out.put_u32(sort_keys.len() as u32);
    for sort_key in sort_keys {
        put_blob(&mut out, sort_key);
    }
    Ok(out.freeze())
}

/// Decode a `multi_remove` request into `(hash_key, sort_keys)`.
pub fn decode_multi_remove_request(mut body: Bytes) -> ClientResult<(Bytes, Vec<Bytes>)> {
    let hash_key = get_hash_key(&mut body)?;
    if body.remaining() < 4 {
        return Err(FramingError::ShortRead.into());
    }
    let count = body.get_u32() as usize;
    let mut sort_keys = Vec::with_capacity(count);
    for _ in 0..count {
        sort_keys.push(get_blob(&mut body)?);
    }
    Ok((hash_key, sort_keys))
}

/// Count response used by `multi_remove` and `sort_key_count`.
pub fn encode_count_response(count: i64) -> Bytes {
    let mut out = BytesMut::with_capacity(8);
    out.put_i64(count);
    out.freeze()
}

/// Decode a count response.
pub fn decode_count_response(mut body: Bytes) -> ClientResult<i64> {
    if body.remaining() < 8 {
        return Err(FramingError::ShortRead.into());
    }
    Ok(body.get_i64())
}

/// `sort_key_count` request: just the hash key.
pub fn encode_sort_key_count_request(hash_key: &[u8]) -> ClientResult<Bytes> {
    check_hash_key(hash_key, true)?;
    let mut out = BytesMut::with_capacity(2 + hash_key.len());
    put_hash_key(&mut out, hash_key);
    Ok(out.freeze())
}

/// Decode a `sort_key_count` request.
pub fn decode_sort_key_count_request(mut body: Bytes) -> ClientResult<Bytes> {
    get_hash_key(&mut body)
}
