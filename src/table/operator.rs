//! The per-call value object and response classification.
//!
//! An [`Operator`] is handed between the table handler and the session layer
//! across attempts: the same instance is re-routed on every retry and gets a
//! fresh sequence id from whichever session carries the attempt. Its trace
//! id is fixed at creation so every attempt of one logical call lines up in
//! logs.

use crate::core::error::{ClientError, ServerCode};
use crate::rpc::frame::ResponseFrame;
use bytes::Bytes;

use crate::base::Gpid;

/// Per-operation retry policy flags.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retry after a routing refresh on stale-routing errors.
    pub refresh_on_stale: bool,
    /// Retry transient server errors (busy, capacity exceeded).
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            refresh_on_stale: true,
            retry_transient: true,
        }
    }
}

/// One logical table operation moving through the retry loop.
pub struct Operator {
    /// ASCII operation code.
    pub op_code: &'static str,
    /// Serialized request body, opaque to the routing engine.
    pub body: Bytes,
    /// Hash of the routing key, computed once.
    pub routing_hash: u64,
    /// Target partition; filled in at route time, refreshed per attempt.
    pub gpid: Gpid,
    /// Per-op deadline in milliseconds; zero or negative means the
    /// configured default.
    pub timeout_ms: i64,
    /// Attempt counter, for logs.
    pub attempt: u32,
    /// Trace id shared by all attempts of this call.
    pub trace_id: u64,
    /// Retry policy flags.
    pub policy: RetryPolicy,
}

impl Operator {
    /// Create an operator with the default timeout and policy.
    pub fn new(op_code: &'static str, routing_hash: u64, body: Bytes) -> Self {
        Self {
            op_code,
            body,
            routing_hash,
            gpid: Gpid::zero(),
            timeout_ms: 0,
            attempt: 0,
            trace_id: rand::random::<u64>(),
            policy: RetryPolicy::default(),
        }
    }

    /// Override the per-op deadline. Zero or negative keeps the configured
    /// default.
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// What the retry loop should do with one attempt's outcome.
#[derive(Debug)]
pub(crate) enum Disposition {
    /// Final success; deliver the frame.
    Complete(ResponseFrame),
    /// Try again, optionally after a routing refresh.
    Retry { refresh: bool },
    /// Final failure; deliver the error.
    Fail(ClientError),
}

/// Classify one attempt's outcome.
///
/// Transport failures and stale-routing codes retry after a refresh;
/// transient server codes retry without one; a per-attempt timeout retries
/// with a refresh since a silent server may be a wrong or dead primary. The
/// loop's deadline accounting decides when retries stop. `Closed` is final
/// only once the client itself is closed.
pub(crate) fn classify(
    outcome: Result<ResponseFrame, ClientError>,
    policy: &RetryPolicy,
    client_closed: bool,
) -> Disposition {
    match outcome {
        Ok(frame) => {
            let code = ServerCode::from_i32(frame.error);
            match code {
                ServerCode::Ok => Disposition::Complete(frame),
                code if code.needs_refresh() && policy.refresh_on_stale => {
                    Disposition::Retry { refresh: true }
                }
                code if code.is_transient() && policy.retry_transient => {
                    Disposition::Retry { refresh: false }
                }
                code => Disposition::Fail(ClientError::ServerError(code)),
            }
        }
        Err(ClientError::Closed) if client_closed => Disposition::Fail(ClientError::Closed),
        Err(e) if e.is_transport() => Disposition::Retry { refresh: true },
        Err(ClientError::Timeout) => Disposition::Retry { refresh: true },
        Err(e) => Disposition::Fail(e),
    }
}
