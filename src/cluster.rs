//! Cluster entry point.
//!
//! A [`Cluster`] owns what every table shares: the resolved configuration,
//! the replica session pool, the meta session, and the counter registry with
//! its optional push reporter. Tables opened from one cluster share all of
//! it; closing the cluster closes every session and completes outstanding
//! operations with `Closed`.

use crate::core::config::ClientConfig;
use crate::core::error::{ClientError, ClientResult};
use crate::ops::metrics::{ClientCounters, MetricsReporter};
use crate::rpc::meta::MetaSession;
use crate::rpc::pool::ReplicaSessionPool;
use crate::table::handler::TableHandler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// State shared between the cluster handle and every table opened from it.
pub(crate) struct ClusterShared {
    pub(crate) config: ClientConfig,
    pub(crate) pool: ReplicaSessionPool,
    pub(crate) meta: MetaSession,
    pub(crate) counters: Arc<ClientCounters>,
    closed: AtomicBool,
    reporter_stop: watch::Sender<bool>,
}

impl ClusterShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Client handle for one cluster. Cheap to clone.
#[derive(Clone)]
pub struct Cluster {
    shared: Arc<ClusterShared>,
}

impl Cluster {
    /// Build a cluster client from a validated configuration.
    ///
    /// Must be called within a Tokio runtime; sessions and the optional
    /// metrics reporter are spawned as tasks on it. Meta hostnames are
    /// resolved synchronously, once, here.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let counters = Arc::new(ClientCounters::default());
        let endpoints = config.meta_endpoints()?;
        info!(
            meta_servers = ?config.meta_servers,
            operation_timeout_ms = config.operation_timeout_ms,
            "creating cluster client"
        );

        let meta = MetaSession::new(
            endpoints,
            config.session.clone(),
            &config.meta,
            Arc::clone(&counters),
        )?;
        let pool = ReplicaSessionPool::new(config.session.clone(), Arc::clone(&counters));

        let (reporter_stop, stop_rx) = watch::channel(false);
        if config.enable_counter {
            let reporter = MetricsReporter::new(
                Arc::clone(&counters),
                config.perf_counter_tags.clone(),
                Duration::from_secs(config.push_interval_secs),
                stop_rx,
            );
            tokio::spawn(reporter.run());
        }

        Ok(Self {
            shared: Arc::new(ClusterShared {
                config,
                pool,
                meta,
                counters,
                closed: AtomicBool::new(false),
                reporter_stop,
            }),
        })
    }

    /// Open a table by name.
    ///
    /// Queries the meta cluster synchronously with the configured operation
    /// timeout and caches the routing table on success.
    pub async fn open_table(&self, name: &str) -> ClientResult<TableHandler> {
        if self.shared.is_closed() {
            return Err(ClientError::Closed);
        }
        if name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "table name must not be empty".into(),
            ));
        }
        TableHandler::open(Arc::clone(&self.shared), name).await
    }

    /// Close the client: stop the reporter, close the meta session and every
    /// replica session. Operations still in flight complete with `Closed`.
    /// Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shared.reporter_stop.send(true);
        self.shared.meta.close();
        self.shared.pool.close_all();
        info!("cluster client closed");
    }

    /// Whether [`Cluster::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The counter registry, for embedding applications that scrape instead
    /// of push.
    pub fn counters(&self) -> Arc<ClientCounters> {
        Arc::clone(&self.shared.counters)
    }

    /// The configuration this cluster was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

/// Retry delay for one operation: a third of its deadline, at least one
/// millisecond.
pub(crate) fn retry_delay(timeout: Duration) -> Duration {
    (timeout / 3).max(Duration::from_millis(1))
}
