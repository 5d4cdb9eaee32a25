//! Shared endpoint-to-session map.
//!
//! All tables in a cluster share one pool; connections are per replica
//! endpoint, not per partition. Reads are lock-free on the hot path, with an
//! entry lock only on first-time insert. Sessions are never removed during
//! normal operation.

use crate::base::Endpoint;
use crate::core::config::SessionConfig;
use crate::ops::metrics::ClientCounters;
use crate::rpc::session::Session;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lazily populated map from replica endpoint to its session.
pub struct ReplicaSessionPool {
    sessions: DashMap<Endpoint, Arc<Session>>,
    config: SessionConfig,
    counters: Arc<ClientCounters>,
    closed: AtomicBool,
}

impl ReplicaSessionPool {
    /// Create an empty pool.
    pub fn new(config: SessionConfig, counters: Arc<ClientCounters>) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            counters,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the session for `endpoint`, creating it on first use.
    ///
    /// After [`ReplicaSessionPool::close_all`] the returned session is
    /// closed and every send on it completes with `Closed`.
    pub fn get(&self, endpoint: Endpoint) -> Arc<Session> {
        if let Some(session) = self.sessions.get(&endpoint) {
            return Arc::clone(&session);
        }
        let session = self
            .sessions
            .entry(endpoint)
            .or_insert_with(|| {
                Session::spawn(
                    endpoint,
                    self.config.clone(),
                    false,
                    Arc::clone(&self.counters),
                )
            })
            .clone();
        if self.closed.load(Ordering::Acquire) {
            session.close();
        }
        session
    }

    /// Number of sessions created so far.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the pool has created any session yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session and clear the map. Subsequent `get` calls return
    /// sessions that complete all sends with `Closed`.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        for entry in self.sessions.iter() {
            entry.value().close();
        }
        self.sessions.clear();
    }
}
