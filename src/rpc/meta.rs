//! Meta cluster querying.
//!
//! The meta session fronts the ordered list of meta endpoints. It remembers
//! the current leader guess, follows forwarding hints when it asked a
//! follower, and rotates round-robin on transport failures, bounded by a
//! retry budget and the caller's deadline. Meta connections are keep-alive:
//! the TCP session stays warm between queries.
//!
//! The query body codec is part of this module: a length-prefixed table name
//! on the way out; on the way back an error code, then either a forwarding
//! hint endpoint or the full partition configuration list.

use crate::base::{Endpoint, Gpid};
use crate::core::config::{MetaConfig, SessionConfig};
use crate::core::error::{ClientError, ClientResult, ServerCode};
use crate::ops::metrics::ClientCounters;
use crate::rpc::codes;
use crate::rpc::frame::FramingError;
use crate::rpc::session::{SendRequest, Session};
use crate::table::routing::PartitionConfiguration;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// A parsed `CM_QUERY_CONFIG` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfigResponse {
    /// Meta-level error code.
    pub err: ServerCode,
    /// Leader hint, present with `ERR_FORWARD_TO_OTHERS`.
    pub forward: Option<Endpoint>,
    /// Application id, valid with `ERR_OK`.
    pub app_id: i32,
    /// Partition count, valid with `ERR_OK`.
    pub partition_count: i32,
    /// Replication factor, valid with `ERR_OK`.
    pub max_replica_count: i32,
    /// Per-partition configurations, valid with `ERR_OK`.
    pub partitions: Vec<PartitionConfiguration>,
}

impl QueryConfigResponse {
    /// A successful reply carrying a full configuration.
    pub fn ok(
        app_id: i32,
        partition_count: i32,
        max_replica_count: i32,
        partitions: Vec<PartitionConfiguration>,
    ) -> Self {
        Self {
            err: ServerCode::Ok,
            forward: None,
            app_id,
            partition_count,
            max_replica_count,
            partitions,
        }
    }

    /// A forwarding reply pointing at the current leader.
    pub fn forward_to(leader: Endpoint) -> Self {
        Self {
            err: ServerCode::ForwardToOthers,
            forward: Some(leader),
            app_id: 0,
            partition_count: 0,
            max_replica_count: 0,
            partitions: Vec::new(),
        }
    }

    /// An error reply with no payload.
    pub fn error(err: ServerCode) -> Self {
        Self {
            err,
            forward: None,
            app_id: 0,
            partition_count: 0,
            max_replica_count: 0,
            partitions: Vec::new(),
        }
    }

    /// Serialize the reply body.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_i32(self.err.as_i32());
        match self.err {
            ServerCode::ForwardToOthers => {
                let hint = self.forward.unwrap_or_else(Endpoint::invalid);
                out.put_u32(hint.ip);
                out.put_u16(hint.port);
            }
            ServerCode::Ok => {
                out.put_i32(self.app_id);
                out.put_i32(self.partition_count);
                out.put_i32(self.max_replica_count);
                for p in &self.partitions {
                    out.put_i64(p.ballot);
                    out.put_u32(p.primary.ip);
                    out.put_u16(p.primary.port);
                    out.put_u16(p.secondaries.len() as u16);
                    for s in &p.secondaries {
                        out.put_u32(s.ip);
                        out.put_u16(s.port);
                    }
                }
            }
            _ => {}
        }
        out.freeze()
    }

    /// Parse a reply body.
    pub fn decode(mut body: Bytes) -> ClientResult<Self> {
        if body.remaining() < 4 {
            return Err(FramingError::ShortRead.into());
        }
        let err = ServerCode::from_i32(body.get_i32());
        match err {
            ServerCode::ForwardToOthers => {
                if body.remaining() < 6 {
                    return Err(FramingError::ShortRead.into());
                }
                let hint = Endpoint::new(body.get_u32(), body.get_u16());
                Ok(Self {
                    forward: Some(hint),
                    ..Self::error(err)
                })
            }
            ServerCode::Ok => {
                if body.remaining() < 12 {
                    return Err(FramingError::ShortRead.into());
                }
                let app_id = body.get_i32();
                let partition_count = body.get_i32();
                let max_replica_count = body.get_i32();
                if partition_count < 0 {
                    return Err(FramingError::ShortRead.into());
                }
                let mut partitions = Vec::with_capacity(partition_count as usize);
                for index in 0..partition_count {
                    if body.remaining() < 16 {
                        return Err(FramingError::ShortRead.into());
                    }
                    let ballot = body.get_i64();
                    let primary = Endpoint::new(body.get_u32(), body.get_u16());
                    let secondary_count = body.get_u16() as usize;
                    if body.remaining() < secondary_count * 6 {
                        return Err(FramingError::ShortRead.into());
                    }
                    let secondaries = (0..secondary_count)
                        .map(|_| Endpoint::new(body.get_u32(), body.get_u16()))
                        .collect();
                    partitions.push(PartitionConfiguration {
                        gpid: Gpid::new(app_id, index),
                        ballot,
                        primary,
                        secondaries,
                        max_replica_count,
                    });
                }
                Ok(Self::ok(
                    app_id,
                    partition_count,
                    max_replica_count,
                    partitions,
                ))
            }
            other => Ok(Self::error(other)),
        }
    }
}

/// Serialize a `CM_QUERY_CONFIG` request body.
pub fn encode_query_config_request(table_name: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(2 + table_name.len());
    out.put_u16(table_name.len() as u16);
    out.put_slice(table_name.as_bytes());
    out.freeze()
}

/// Parse a `CM_QUERY_CONFIG` request body.
pub fn decode_query_config_request(mut body: Bytes) -> ClientResult<String> {
    if body.remaining() < 2 {
        return Err(FramingError::ShortRead.into());
    }
    let len = body.get_u16() as usize;
    if body.remaining() < len {
        return Err(FramingError::ShortRead.into());
    }
    let name = body.split_to(len);
    String::from_utf8(name.to_vec())
        .map_err(|_| ClientError::InvalidArgument("table name is not utf-8".into()))
}

/// Session specialization fronting the meta cluster.
pub struct MetaSession {
    endpoints: Vec<Endpoint>,
    /// Packed endpoint of the current leader guess.
    leader: AtomicU64,
    sessions: DashMap<Endpoint, Arc<Session>>,
    session_config: SessionConfig,
    max_retry: u32,
    counters: Arc<ClientCounters>,
}

impl MetaSession {
    /// Create a meta session over the ordered endpoint list.
    pub fn new(
        endpoints: Vec<Endpoint>,
        session_config: SessionConfig,
        meta_config: &MetaConfig,
        counters: Arc<ClientCounters>,
    ) -> ClientResult<Self> {
        if endpoints.is_empty() {
            return Err(ClientError::InvalidArgument(
                "meta endpoint list is empty".into(),
            ));
        }
        let leader = AtomicU64::new(endpoints[0].pack());
        Ok(Self {
            endpoints,
            leader,
            sessions: DashMap::new(),
            session_config,
            max_retry: meta_config.max_retry,
            counters,
        })
    }

    /// The current leader guess.
    pub fn leader(&self) -> Endpoint {
        Endpoint::unpack(self.leader.load(Ordering::Acquire))
    }

    fn set_leader(&self, endpoint: Endpoint) {
        self.leader.store(endpoint.pack(), Ordering::Release);
    }

    fn session(&self, endpoint: Endpoint) -> Arc<Session> {
        self.sessions
            .entry(endpoint)
            .or_insert_with(|| {
                Session::spawn(
                    endpoint,
                    self.session_config.clone(),
                    true,
                    Arc::clone(&self.counters),
                )
            })
            .clone()
    }

    /// Query the partition configuration of `table_name`.
    ///
    /// Starts at the leader guess, follows forwarding hints, rotates on
    /// transport failure, and gives up after the retry budget or deadline.
    pub async fn query_config(
        &self,
        table_name: &str,
        timeout: Duration,
    ) -> ClientResult<QueryConfigResponse> {
        let deadline = Instant::now() + timeout;
        let trace_id = rand::random::<u64>();
        let mut target = self.leader();
        let mut rotation = self
            .endpoints
            .iter()
            .position(|e| *e == target)
            .unwrap_or(0);

        for attempt in 1..=self.max_retry {
            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout);
            }
            let remaining = deadline - now;

            ClientCounters::incr(&self.counters.meta_queries);
            let (tx, rx) = oneshot::channel();
            self.session(target).send(SendRequest {
                op_code: codes::CM_QUERY_CONFIG,
                gpid: Gpid::zero(),
                body: encode_query_config_request(table_name),
                timeout_ms: remaining.as_millis().min(u32::MAX as u128) as u32,
                deadline,
                trace_id,
                completion: tx,
            });

            let outcome = match rx.await {
                Ok(outcome) => outcome,
                // Completion dropped; treat like a transport failure.
                Err(_) => Err(ClientError::Closed),
            };

            match outcome {
                Ok(frame) => {
                    if frame.error != 0 {
                        warn!(
                            table = table_name,
                            meta = %target,
                            error = %ServerCode::from_i32(frame.error),
                            "meta query failed at frame level"
                        );
                        rotation = (rotation + 1) % self.endpoints.len();
                        target = self.endpoints[rotation];
                        continue;
                    }
                    let reply = QueryConfigResponse::decode(frame.body)?;
                    match reply.err {
                        ServerCode::Ok => {
                            self.set_leader(target);
                            return Ok(reply);
                        }
                        ServerCode::ForwardToOthers => {
                            let hint = reply.forward.unwrap_or_else(Endpoint::invalid);
                            debug!(
                                table = table_name,
                                meta = %target,
                                hint = %hint,
                                attempt,
                                "meta forwarded to leader"
                            );
                            if hint.is_invalid() {
                                rotation = (rotation + 1) % self.endpoints.len();
                                target = self.endpoints[rotation];
                            } else {
                                self.set_leader(hint);
                                target = hint;
                            }
                            continue;
                        }
                        ServerCode::ObjectNotFound => {
                            return Err(ClientError::TableNotFound(table_name.to_string()));
                        }
                        other => {
                            warn!(
                                table = table_name,
                                meta = %target,
                                error = %other,
                                attempt,
                                "meta query returned error"
                            );
                            rotation = (rotation + 1) % self.endpoints.len();
                            target = self.endpoints[rotation];
                            continue;
                        }
                    }
                }
                Err(ClientError::Timeout) => return Err(ClientError::Timeout),
                Err(e) => {
                    debug!(
                        table = table_name,
                        meta = %target,
                        error = %e,
                        attempt,
                        "meta endpoint failed, rotating"
                    );
                    rotation = (rotation + 1) % self.endpoints.len();
                    target = self.endpoints[rotation];
                    continue;
                }
            }
        }
        Err(ClientError::MetaUnreachable)
    }

    /// Close every meta session.
    pub fn close(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
    }
}
