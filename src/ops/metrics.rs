//! Client-side counters and metrics push.
//!
//! The counter registry is always present and nearly free to update (relaxed
//! atomics). When counters are enabled in the configuration, a background
//! reporter serializes a snapshot every push interval and POSTs it to the
//! local falcon-style agent at `127.0.0.1:1988/v1/push`. Push failures are
//! logged and never surfaced to callers.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Address of the local metrics agent.
const AGENT_ADDR: &str = "127.0.0.1:1988";

/// HTTP path the agent accepts pushes on.
const AGENT_PATH: &str = "/v1/push";

/// Connect timeout for the agent.
const AGENT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Counters updated from the client hot paths.
#[derive(Debug, Default)]
pub struct ClientCounters {
    /// Requests written to a session.
    pub requests_sent: AtomicU64,

    /// Responses matched to a pending request.
    pub responses_received: AtomicU64,

    /// Requests that expired before a response arrived.
    pub request_timeouts: AtomicU64,

    /// Requests rejected because a pending-send buffer was full.
    pub send_overflows: AtomicU64,

    /// Successful session connects.
    pub session_connects: AtomicU64,

    /// Session disconnects (socket error, peer close, decode failure).
    pub session_disconnects: AtomicU64,

    /// Meta configuration queries issued.
    pub meta_queries: AtomicU64,

    /// Routing table refreshes applied.
    pub routing_refreshes: AtomicU64,
}

impl ClientCounters {
    /// Increment a counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot every counter as `(name, value)` pairs.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        vec![
            ("client.requests_sent", read(&self.requests_sent)),
            ("client.responses_received", read(&self.responses_received)),
            ("client.request_timeouts", read(&self.request_timeouts)),
            ("client.send_overflows", read(&self.send_overflows)),
            ("client.session_connects", read(&self.session_connects)),
            ("client.session_disconnects", read(&self.session_disconnects)),
            ("client.meta_queries", read(&self.meta_queries)),
            ("client.routing_refreshes", read(&self.routing_refreshes)),
        ]
    }
}

/// Background reporter pushing counter snapshots to the local agent.
pub struct MetricsReporter {
    counters: Arc<ClientCounters>,
    tags: String,
    interval: Duration,
    stop_rx: watch::Receiver<bool>,
}

impl MetricsReporter {
    /// Create a reporter. It does nothing until [`MetricsReporter::run`] is
    /// spawned.
    pub fn new(
        counters: Arc<ClientCounters>,
        tags: String,
        interval: Duration,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            counters,
            tags,
            interval,
            stop_rx,
        }
    }

    /// Push loop. Exits when the stop signal flips.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.stop_rx.changed() => {
                    if *self.stop_rx.borrow() {
                        return;
                    }
                }
            }
            if let Err(e) = self.push_once().await {
                tracing::debug!(agent = AGENT_ADDR, error = %e, "metrics push failed");
            }
        }
    }

    /// Serialize a snapshot and POST it to the agent.
    async fn push_once(&self) -> std::io::Result<()> {
        let body = self.payload();
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            AGENT_PATH,
            AGENT_ADDR,
            body.len(),
            body
        );

        let connect = TcpStream::connect(AGENT_ADDR);
        let mut stream = tokio::time::timeout(AGENT_CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "agent connect"))??;
        stream.write_all(request.as_bytes()).await?;

        // Read whatever the agent answers; the push is fire-and-forget.
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        Ok(())
    }

    /// Falcon agent payload: a JSON array with one entry per counter.
    fn payload(&self) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let step = self.interval.as_secs();
        let entries: Vec<_> = self
            .counters
            .snapshot()
            .into_iter()
            .map(|(metric, value)| {
                json!({
                    "endpoint": "plexus-client",
                    "metric": metric,
                    "tags": self.tags,
                    "timestamp": timestamp,
                    "step": step,
                    "value": value,
                    "counterType": "GAUGE",
                })
            })
            .collect();
        serde_json::Value::Array(entries).to_string()
    }
}
