//! Per-table routing cache and the execute retry loop.
//!
//! A table handler owns its routing snapshot and drives every operation
//! through the same lifecycle: route by hash, send to the partition's
//! primary, classify the outcome, and retry with refresh and backoff until
//! the deadline runs out. Refreshes coalesce: concurrent triggers for the
//! same table collapse into one in-flight meta query.

use crate::cluster::{retry_delay, ClusterShared};
use crate::core::error::{ClientError, ClientResult};
use crate::ops::metrics::ClientCounters;
use crate::rpc::frame::ResponseFrame;
use crate::rpc::session::SendRequest;
use crate::table::operator::{classify, Disposition, Operator};
use crate::table::routing::TableRouting;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Handle to one open table. Cheap to clone; clones share the routing cache.
#[derive(Clone)]
pub struct TableHandler {
    inner: Arc<TableInner>,
}

impl std::fmt::Debug for TableHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHandler")
            .field("name", &self.inner.name)
            .finish()
    }
}

struct TableInner {
    name: String,
    cluster: Arc<ClusterShared>,
    /// Published routing snapshot; readers clone the `Arc`, refresh swaps it.
    routing: RwLock<Arc<TableRouting>>,
    /// Serializes refreshes so concurrent triggers coalesce.
    refresh_lock: tokio::sync::Mutex<()>,
    refresh_interval: Duration,
    default_timeout: Duration,
}

impl TableHandler {
    /// Open a table: query the meta cluster and cache the routing table.
    pub(crate) async fn open(cluster: Arc<ClusterShared>, name: &str) -> ClientResult<Self> {
        let timeout = cluster.config.operation_timeout();
        let reply = cluster.meta.query_config(name, timeout).await?;
        let routing = TableRouting::new(reply.app_id, reply.partition_count, reply.partitions, 1)?;
        info!(
            table = name,
            app_id = routing.app_id,
            partition_count = routing.partition_count,
            "table opened"
        );
        Ok(Self {
            inner: Arc::new(TableInner {
                name: name.to_string(),
                refresh_interval: cluster.config.routing.refresh_interval(),
                default_timeout: timeout,
                cluster,
                routing: RwLock::new(Arc::new(routing)),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Application id assigned by the meta cluster.
    pub fn app_id(&self) -> i32 {
        self.snapshot().app_id
    }

    /// Partition count of the open table.
    pub fn partition_count(&self) -> i32 {
        self.snapshot().partition_count
    }

    /// Current routing snapshot.
    pub(crate) fn snapshot(&self) -> Arc<TableRouting> {
        Arc::clone(&self.inner.routing.read())
    }

    /// Refresh the routing table from meta, coalescing concurrent triggers.
    ///
    /// A caller that raced a completed refresh (the observed generation is
    /// no longer current) returns without querying meta again.
    pub(crate) async fn refresh(&self, observed_generation: u64) -> ClientResult<()> {
        let inner = &self.inner;
        let _guard = inner.refresh_lock.lock().await;

        let current = self.snapshot();
        if current.generation() != observed_generation {
            return Ok(());
        }

        let reply = inner
            .cluster
            .meta
            .query_config(&inner.name, inner.cluster.config.operation_timeout())
            .await?;
        let merged = current.merged_with(
            reply.app_id,
            reply.partition_count,
            reply.partitions,
            current.generation() + 1,
        )?;
        debug!(
            table = %inner.name,
            generation = merged.generation(),
            "routing table refreshed"
        );
        *inner.routing.write() = Arc::new(merged);
        ClientCounters::incr(&inner.cluster.counters.routing_refreshes);
        Ok(())
    }

    /// Kick a refresh without waiting for it.
    fn spawn_refresh(&self, observed_generation: u64) {
        let handler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.refresh(observed_generation).await {
                warn!(table = %handler.inner.name, error = %e, "background refresh failed");
            }
        });
    }

    /// Await a refresh, bounded by the caller's remaining budget.
    async fn refresh_within(&self, observed_generation: u64, budget: Duration) {
        if let Err(e) = tokio::time::timeout(budget, self.refresh(observed_generation)).await {
            debug!(table = %self.inner.name, error = %e, "refresh did not finish within budget");
        }
    }

    /// Drive one operation to completion: route, send, classify, retry.
    pub async fn execute(&self, mut op: Operator) -> ClientResult<ResponseFrame> {
        let inner = &self.inner;
        let timeout = if op.timeout_ms > 0 {
            Duration::from_millis(op.timeout_ms as u64)
        } else {
            inner.default_timeout
        };
        let deadline = Instant::now() + timeout;
        let delay = retry_delay(timeout);
        let mut transport_failure = None;

        loop {
            if inner.cluster.is_closed() {
                return Err(ClientError::Closed);
            }
            op.attempt += 1;

            let snapshot = self.snapshot();
            if snapshot.age() >= inner.refresh_interval {
                self.spawn_refresh(snapshot.generation());
            }

            let partition_index = snapshot.partition_index(op.routing_hash);
            let config = snapshot.config(partition_index);
            op.gpid = config.gpid;
            let primary = config.primary;

            if primary.is_invalid() {
                debug!(
                    table = %inner.name,
                    partition = partition_index,
                    attempt = op.attempt,
                    "partition has no primary, refreshing"
                );
                let now = Instant::now();
                if now >= deadline {
                    return Err(ClientError::Timeout);
                }
                self.refresh_within(snapshot.generation(), deadline - now).await;
                let now = Instant::now();
                if now + delay >= deadline {
                    return Err(ClientError::Timeout);
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout);
            }
            let remaining = deadline - now;
            let attempt_budget = remaining.min(inner.default_timeout);

            let session = inner.cluster.pool.get(primary);
            let (tx, rx) = oneshot::channel();
            session.send(SendRequest {
                op_code: op.op_code,
                gpid: op.gpid,
                body: op.body.clone(),
                timeout_ms: attempt_budget.as_millis().min(u32::MAX as u128) as u32,
                deadline: now + attempt_budget,
                trace_id: op.trace_id,
                completion: tx,
            });

            let outcome = match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(ClientError::Closed),
            };
            transport_failure = match &outcome {
                Err(e) if e.is_transport() => Some(primary),
                _ => None,
            };

            match classify(outcome, &op.policy, inner.cluster.is_closed()) {
                Disposition::Complete(frame) => return Ok(frame),
                Disposition::Fail(e) => {
                    debug!(
                        table = %inner.name,
                        op = op.op_code,
                        trace_id = op.trace_id,
                        attempt = op.attempt,
                        error = %e,
                        "operation failed"
                    );
                    return Err(e);
                }
                Disposition::Retry { refresh } => {
                    if refresh {
                        let now = Instant::now();
                        if now < deadline {
                            self.refresh_within(snapshot.generation(), deadline - now).await;
                        }
                    }
                    let now = Instant::now();
                    if now + delay >= deadline {
                        return Err(match transport_failure {
                            Some(endpoint) => ClientError::ReplicaUnreachable(endpoint),
                            None => ClientError::Timeout,
                        });
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
