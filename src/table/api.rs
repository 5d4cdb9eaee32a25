//! Data operations.
//!
//! Thin adapters over [`TableHandler::execute`]: each method builds a body,
//! derives the routing hash once, and decodes the response. Every operation
//! takes a `timeout_ms` where zero or a negative value means the configured
//! default deadline.

use crate::base::hash;
use crate::core::error::ClientResult;
use crate::rpc::codes;
use crate::table::codec;
use crate::table::handler::TableHandler;
use crate::table::operator::Operator;
use bytes::Bytes;

impl TableHandler {
    /// Read the value at `(hash_key, sort_key)`. `None` when absent.
    pub async fn get(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout_ms: i64,
    ) -> ClientResult<Option<Bytes>> {
        let body = codec::encode_get_request(hash_key, sort_key)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_GET,
            hash::routing_hash(hash_key, sort_key),
            body,
        )
        .with_timeout_ms(timeout_ms);
        let frame = self.execute(op).await?;
        codec::decode_get_response(frame.body)
    }

    /// Write `value` at `(hash_key, sort_key)` with no expiry.
    pub async fn set(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        timeout_ms: i64,
    ) -> ClientResult<()> {
        self.set_with_ttl(hash_key, sort_key, value, 0, timeout_ms)
            .await
    }

    /// Write `value` at `(hash_key, sort_key)`, expiring after
    /// `ttl_seconds` (zero = never).
    pub async fn set_with_ttl(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        ttl_seconds: i32,
        timeout_ms: i64,
    ) -> ClientResult<()> {
        let body = codec::encode_put_request(hash_key, sort_key, value, ttl_seconds)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_PUT,
            hash::routing_hash(hash_key, sort_key),
            body,
        )
        .with_timeout_ms(timeout_ms);
        self.execute(op).await?;
        Ok(())
    }

    /// Remove the value at `(hash_key, sort_key)`. Removing an absent key
    /// succeeds.
    pub async fn del(&self, hash_key: &[u8], sort_key: &[u8], timeout_ms: i64) -> ClientResult<()> {
        let body = codec::encode_remove_request(hash_key, sort_key)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_REMOVE,
            hash::routing_hash(hash_key, sort_key),
            body,
        )
        .with_timeout_ms(timeout_ms);
        self.execute(op).await?;
        Ok(())
    }

    /// Check whether `(hash_key, sort_key)` exists.
    pub async fn exists(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout_ms: i64,
    ) -> ClientResult<bool> {
        Ok(self.ttl(hash_key, sort_key, timeout_ms).await?.is_some())
    }

    /// Remaining time-to-live in seconds. `None` when the key does not
    /// exist; a negative value means the key never expires.
    pub async fn ttl(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        timeout_ms: i64,
    ) -> ClientResult<Option<i32>> {
        let body = codec::encode_key(hash_key, sort_key)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_TTL,
            hash::routing_hash(hash_key, sort_key),
            body,
        )
        .with_timeout_ms(timeout_ms);
        let frame = self.execute(op).await?;
        codec::decode_ttl_response(frame.body)
    }

    /// Atomically add `increment` to the integer at `(hash_key, sort_key)`
    /// and return the new value. An absent key counts as zero.
    pub async fn incr(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        increment: i64,
        timeout_ms: i64,
    ) -> ClientResult<i64> {
        let body = codec::encode_incr_request(hash_key, sort_key, increment)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_INCR,
            hash::routing_hash(hash_key, sort_key),
            body,
        )
        .with_timeout_ms(timeout_ms);
        let frame = self.execute(op).await?;
        codec::decode_incr_response(frame.body)
    }

    /// Read up to `max_kv_count` values under `hash_key`. An empty
    /// `sort_keys` list reads everything, ascending by sort key. Returns
    /// whether the read was complete plus the `(sort_key, value)` pairs.
    pub async fn multi_get(
        &self,
        hash_key: &[u8],
        sort_keys: &[&[u8]],
        max_kv_count: i32,
        timeout_ms: i64,
    ) -> ClientResult<(bool, Vec<(Bytes, Bytes)>)> {
        let body = codec::encode_multi_get_request(hash_key, sort_keys, max_kv_count)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_MULTI_GET,
            hash::routing_hash(hash_key, b""),
            body,
        )
        .with_timeout_ms(timeout_ms);
        let frame = self.execute(op).await?;
        codec::decode_multi_get_response(frame.body)
    }

    /// Write several `(sort_key, value)` pairs under one hash key, all
    /// expiring after `ttl_seconds` (zero = never).
    pub async fn multi_set(
        &self,
        hash_key: &[u8],
        pairs: &[(&[u8], &[u8])],
        ttl_seconds: i32,
        timeout_ms: i64,
    ) -> ClientResult<()> {
        let body = codec::encode_multi_put_request(hash_key, pairs, ttl_seconds)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_MULTI_PUT,
            hash::routing_hash(hash_key, b""),
            body,
        )
        .with_timeout_ms(timeout_ms);
        self.execute(op).await?;
        Ok(())
    }

    /// Remove several sort keys under one hash key; returns how many were
    /// removed.
    pub async fn multi_del(
        &self,
        hash_key: &[u8],
        sort_keys: &[&[u8]],
        timeout_ms: i64,
    ) -> ClientResult<i64> {
        let body = codec::encode_multi_remove_request(hash_key, sort_keys)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_MULTI_REMOVE,
            hash::routing_hash(hash_key, b""),
            body,
        )
        .with_timeout_ms(timeout_ms);
        let frame = self.execute(op).await?;
        codec::decode_count_response(frame.body)
    }

    /// Count the sort keys stored under `hash_key`.
    pub async fn sort_key_count(&self, hash_key: &[u8], timeout_ms: i64) -> ClientResult<i64> {
        let body = codec::encode_sort_key_count_request(hash_key)?;
        let op = Operator::new(
            codes::RPC_RRDB_RRDB_SORTKEY_COUNT,
            hash::routing_hash(hash_key, b""),
            body,
        )
        .with_timeout_ms(timeout_ms);
        let frame = self.execute(op).await?;
        codec::decode_count_response(frame.body)
    }
}
