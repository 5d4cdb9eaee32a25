//! Common test utilities.
//!
//! In-process mock meta and replica servers speaking the client's wire
//! protocol. Import with `mod common;` in test files.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use plexus::base::Gpid;
use plexus::rpc::frame::{self, RequestFrame, ResponseFrame, DEFAULT_MAX_FRAME_SIZE};
use plexus::rpc::meta::{decode_query_config_request, QueryConfigResponse};
use plexus::rpc::codes;
use plexus::table::codec;
use plexus::table::routing::PartitionConfiguration;
use plexus::{Endpoint, ServerCode};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Opt-in log output for debugging a test run: honors `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Server behavior: zero or more response frames per request. An empty
/// vector keeps the server silent for that request.
pub type Behavior = Arc<dyn Fn(&RequestFrame) -> Vec<ResponseFrame> + Send + Sync>;

/// One mock server bound to an ephemeral loopback port.
pub struct MockServer {
    pub endpoint: Endpoint,
    /// Requests the server has accepted, across all connections.
    pub requests: Arc<AtomicU64>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Bind and serve `behavior` until dropped.
    pub async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let endpoint = Endpoint::try_from(listener.local_addr().unwrap()).unwrap();
        let requests = Arc::new(AtomicU64::new(0));
        let accepted = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let behavior = Arc::clone(&behavior);
                let requests = Arc::clone(&accepted);
                tokio::spawn(async move {
                    let mut buf = BytesMut::new();
                    loop {
                        match frame::decode_request(&mut buf, DEFAULT_MAX_FRAME_SIZE) {
                            Ok(Some(request)) => {
                                requests.fetch_add(1, Ordering::SeqCst);
                                for response in behavior(&request) {
                                    if stream
                                        .write_all(&frame::encode_response(&response))
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                                continue;
                            }
                            Ok(None) => {}
                            Err(_) => return,
                        }
                        match stream.read_buf(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                    }
                });
            }
        });

        Self {
            endpoint,
            requests,
            handle,
        }
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reserve a loopback endpoint nothing listens on; connects to it are
/// refused.
pub async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let endpoint = Endpoint::try_from(listener.local_addr().unwrap()).unwrap();
    drop(listener);
    endpoint
}

/// A success response echoing the request's correlation fields.
pub fn ok_response(request: &RequestFrame, body: Bytes) -> ResponseFrame {
    ResponseFrame {
        seq_id: request.seq_id,
        trace_id: request.trace_id,
        error: ServerCode::Ok.as_i32(),
        op_code: request.op_code.clone(),
        body,
    }
}

/// An error response echoing the request's correlation fields.
pub fn err_response(request: &RequestFrame, code: ServerCode) -> ResponseFrame {
    ResponseFrame {
        seq_id: request.seq_id,
        trace_id: request.trace_id,
        error: code.as_i32(),
        op_code: request.op_code.clone(),
        body: Bytes::new(),
    }
}

/// Behavior: acknowledge every request with an empty success body.
pub fn echo_ok() -> Behavior {
    Arc::new(|request| vec![ok_response(request, Bytes::new())])
}

/// Behavior: never respond.
pub fn silent() -> Behavior {
    Arc::new(|_| Vec::new())
}

/// Behavior: fail every request with `code`.
pub fn always_err(code: ServerCode) -> Behavior {
    Arc::new(move |request| vec![err_response(request, code)])
}

/// Behavior: hold the first request back and answer it after the second, so
/// responses arrive out of order. Each response body echoes its own request
/// body.
pub fn reordering() -> Behavior {
    let held: Arc<Mutex<Option<ResponseFrame>>> = Arc::new(Mutex::new(None));
    Arc::new(move |request| {
        let response = ok_response(request, request.body.clone());
        let mut held = held.lock();
        match held.take() {
            None => {
                *held = Some(response);
                Vec::new()
            }
            Some(first) => vec![response, first],
        }
    })
}

/// Partition configurations putting every partition's primary at `primary`.
pub fn partitions_at(app_id: i32, count: i32, primary: Endpoint) -> Vec<PartitionConfiguration> {
    partitions_at_with_ballot(app_id, count, primary, 3)
}

/// Like [`partitions_at`] with an explicit ballot.
pub fn partitions_at_with_ballot(
    app_id: i32,
    count: i32,
    primary: Endpoint,
    ballot: i64,
) -> Vec<PartitionConfiguration> {
    (0..count)
        .map(|i| PartitionConfiguration {
            gpid: Gpid::new(app_id, i),
            ballot,
            primary,
            secondaries: vec![],
            max_replica_count: 3,
        })
        .collect()
}

/// Behavior: a meta server answering `CM_QUERY_CONFIG` from a reply queue,
/// repeating the last reply once the queue drains.
pub fn meta_with_replies(replies: Vec<QueryConfigResponse>) -> Behavior {
    let queue = Arc::new(Mutex::new(VecDeque::from(replies)));
    Arc::new(move |request| {
        assert_eq!(request.op_code, codes::CM_QUERY_CONFIG);
        decode_query_config_request(request.body.clone()).expect("query body");
        let mut queue = queue.lock();
        let reply = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("meta reply queue is empty")
        };
        vec![ok_response(request, reply.encode())]
    })
}

/// Behavior: a meta server answering every query identically.
pub fn meta_serving(reply: QueryConfigResponse) -> Behavior {
    meta_with_replies(vec![reply])
}

/// Shared state of the in-memory replica store.
pub type KvStore = Arc<Mutex<BTreeMap<(Vec<u8>, Vec<u8>), Vec<u8>>>>;

/// Record of partition ids the replica saw, in arrival order.
pub type GpidLog = Arc<Mutex<Vec<Gpid>>>;

/// Behavior: an in-memory replica implementing the data operations.
///
/// Returns the behavior plus handles to the store and the gpid log for
/// assertions.
pub fn kv_replica() -> (Behavior, KvStore, GpidLog) {
    let store: KvStore = Arc::new(Mutex::new(BTreeMap::new()));
    let gpids: GpidLog = Arc::new(Mutex::new(Vec::new()));
    let behavior_store = Arc::clone(&store);
    let behavior_gpids = Arc::clone(&gpids);

    let behavior: Behavior = Arc::new(move |request| {
        behavior_gpids.lock().push(request.gpid);
        let mut store = behavior_store.lock();
        let body = request.body.clone();
        let response = match request.op_code.as_str() {
            codes::RPC_RRDB_RRDB_GET => {
                let (h, s) = codec::decode_key(body).unwrap();
                let value = store.get(&(h.to_vec(), s.to_vec()));
                ok_response(request, codec::encode_get_response(value.map(|v| &v[..])))
            }
            codes::RPC_RRDB_RRDB_PUT => {
                let (h, s, v, _ttl) = codec::decode_put_request(body).unwrap();
                store.insert((h.to_vec(), s.to_vec()), v.to_vec());
                ok_response(request, Bytes::new())
            }
            codes::RPC_RRDB_RRDB_REMOVE => {
                let (h, s) = codec::decode_key(body).unwrap();
                store.remove(&(h.to_vec(), s.to_vec()));
                ok_response(request, Bytes::new())
            }
            codes::RPC_RRDB_RRDB_INCR => {
                let (h, s, delta) = codec::decode_incr_request(body).unwrap();
                let key = (h.to_vec(), s.to_vec());
                let current = store
                    .get(&key)
                    .and_then(|v| std::str::from_utf8(v).ok())
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                let updated = current + delta;
                store.insert(key, updated.to_string().into_bytes());
                ok_response(request, codec::encode_incr_response(updated))
            }
            codes::RPC_RRDB_RRDB_TTL => {
                let (h, s) = codec::decode_key(body).unwrap();
                let ttl = store
                    .contains_key(&(h.to_vec(), s.to_vec()))
                    .then_some(-1);
                ok_response(request, codec::encode_ttl_response(ttl))
            }
            codes::RPC_RRDB_RRDB_SORTKEY_COUNT => {
                let h = codec::decode_sort_key_count_request(body).unwrap();
                let count = store.keys().filter(|(kh, _)| kh == &h.to_vec()).count();
                ok_response(request, codec::encode_count_response(count as i64))
            }
            codes::RPC_RRDB_RRDB_MULTI_GET => {
                let (h, sort_keys, max_kv_count) =
                    codec::decode_multi_get_request(body).unwrap();
                let wanted: Vec<Vec<u8>> = sort_keys.iter().map(|s| s.to_vec()).collect();
                let mut pairs = Vec::new();
                let mut all_fetched = true;
                for ((kh, ks), v) in store.iter() {
                    if kh != &h.to_vec() {
                        continue;
                    }
                    if !wanted.is_empty() && !wanted.contains(ks) {
                        continue;
                    }
                    if max_kv_count >= 0 && pairs.len() as i32 >= max_kv_count {
                        all_fetched = false;
                        break;
                    }
                    pairs.push((Bytes::from(ks.clone()), Bytes::from(v.clone())));
                }
                ok_response(request, codec::encode_multi_get_response(all_fetched, &pairs))
            }
            codes::RPC_RRDB_RRDB_MULTI_PUT => {
                let (h, pairs, _ttl) = codec::decode_multi_put_request(body).unwrap();
                for (s, v) in pairs {
                    store.insert((h.to_vec(), s.to_vec()), v.to_vec());
                }
                ok_response(request, Bytes::new())
            }
            codes::RPC_RRDB_RRDB_MULTI_REMOVE => {
                let (h, sort_keys) = codec::decode_multi_remove_request(body).unwrap();
                let mut removed = 0;
                for s in sort_keys {
                    if store.remove(&(h.to_vec(), s.to_vec())).is_some() {
                        removed += 1;
                    }
                }
                ok_response(request, codec::encode_count_response(removed))
            }
            other => panic!("mock replica got unexpected op {other}"),
        };
        vec![response]
    });

    (behavior, store, gpids)
}
