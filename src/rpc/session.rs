//! One long-lived TCP session per remote endpoint.
//!
//! A session is a handle plus a driver task. The driver owns the connection,
//! the pending-request table, the deadline heap, and the pre-connect send
//! queue; because all of that state lives in a single task there is no
//! locking on the request path. Callers talk to the driver through an
//! unbounded command channel, so [`Session::send`] never blocks and never
//! awaits.
//!
//! Lifecycle: `Disconnected → Connecting → Connected → Closing → Closed`.
//! Only `Connected` writes frames. The first send triggers the connect;
//! connect failures and socket errors schedule a reconnect with exponential
//! backoff (reset on success), but only while there are queued requests or
//! the session is marked keep-alive.

use crate::base::{Endpoint, Gpid};
use crate::core::config::SessionConfig;
use crate::core::error::ClientError;
use crate::ops::metrics::ClientCounters;
use crate::rpc::frame::{self, FramingError, RequestFrame, ResponseFrame};
use bytes::{Bytes, BytesMut};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

/// Completion side of one request: resolved with the response frame or the
/// error kind, exactly once.
pub type Completion = oneshot::Sender<Result<ResponseFrame, ClientError>>;

/// A request handed to a session.
pub struct SendRequest {
    /// ASCII operation code.
    pub op_code: &'static str,
    /// Target partition; zero for meta operations.
    pub gpid: Gpid,
    /// Serialized request body.
    pub body: Bytes,
    /// Client budget advertised to the server, milliseconds.
    pub timeout_ms: u32,
    /// Hard deadline for this attempt.
    pub deadline: Instant,
    /// Trace id carried across retries.
    pub trace_id: u64,
    /// Completion sink.
    pub completion: Completion,
}

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No connection and no connect in progress.
    Disconnected = 0,
    /// TCP connect in flight.
    Connecting = 1,
    /// Connection established; frames flow.
    Connected = 2,
    /// Close requested; pending requests draining.
    Closing = 3,
    /// Fully closed; all sends complete with `Closed`.
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

enum Command {
    Send(SendRequest),
    Close,
}

/// Handle to one session. Cheap to clone via `Arc`.
pub struct Session {
    remote: Endpoint,
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<AtomicU8>,
}

impl Session {
    /// Spawn a session driver for `remote` on the ambient runtime.
    ///
    /// `keep_alive` sessions (meta) reconnect even with nothing queued, so
    /// the connection stays warm between calls.
    pub fn spawn(
        remote: Endpoint,
        config: SessionConfig,
        keep_alive: bool,
        counters: Arc<ClientCounters>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(SessionState::Disconnected as u8));
        let reconnect_delay = config.reconnect_delay();
        let driver = Driver {
            remote,
            config,
            keep_alive,
            rx,
            state: Arc::clone(&state),
            counters,
            next_seq: 1,
            queued: VecDeque::new(),
            pending: HashMap::new(),
            deadlines: BinaryHeap::new(),
            reconnect_delay,
            want_connect: false,
        };
        tokio::spawn(driver.run());
        Arc::new(Self { remote, tx, state })
    }

    /// The remote endpoint this session is bound to.
    pub fn remote(&self) -> Endpoint {
        self.remote
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Enqueue a request. Never blocks.
    ///
    /// If the session is closed the completion resolves immediately with
    /// [`ClientError::Closed`]; if the pending-send buffer is full it
    /// resolves with [`ClientError::Overflow`].
    pub fn send(&self, request: SendRequest) {
        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(Command::Send(request)) {
            if let Command::Send(request) = cmd {
                let _ = request.completion.send(Err(ClientError::Closed));
            }
        }
    }

    /// Request an orderly close. Outstanding requests complete with
    /// [`ClientError::Closed`].
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }
}

/// A request that has been written and awaits its response.
struct Pending {
    deadline: Instant,
    op_code: &'static str,
    trace_id: u64,
    completion: Completion,
}

enum Exit {
    Closed,
    Disconnected,
}

struct Driver {
    remote: Endpoint,
    config: SessionConfig,
    keep_alive: bool,
    rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<AtomicU8>,
    counters: Arc<ClientCounters>,
    /// Next sequence id; monotonic in enqueue order, never reused.
    next_seq: u64,
    /// Requests accepted while not connected, flushed in order on connect.
    queued: VecDeque<SendRequest>,
    /// Written requests awaiting a response, keyed by sequence id.
    pending: HashMap<u64, Pending>,
    /// Min-heap of `(deadline, seq_id)` driving a single timer.
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    reconnect_delay: Duration,
    want_connect: bool,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.set_state(SessionState::Disconnected);
            // Idle until something warrants a connection.
            while self.queued.is_empty() && !self.want_connect {
                match self.rx.recv().await {
                    Some(Command::Send(req)) => self.enqueue(req),
                    Some(Command::Close) | None => return self.shutdown(),
                }
            }
            self.want_connect = false;

            match self.connect().await {
                ConnectOutcome::Connected(stream) => {
                    self.reconnect_delay = self.config.reconnect_delay();
                    if let Exit::Closed = self.run_connected(stream).await {
                        return;
                    }
                }
                ConnectOutcome::Failed => {
                    debug!(remote = %self.remote, "connect failed");
                    // Callers observe the transport failure instead of
                    // waiting out the reconnect schedule; retry policy is
                    // theirs, not the session's.
                    self.fail_queued_transport();
                }
                ConnectOutcome::CloseRequested => return self.shutdown(),
            }

            // Reconnect only for queued work or keep-alive sessions; others
            // go idle until the next send.
            self.want_connect = !self.queued.is_empty() || self.keep_alive;
            if !self.backoff().await {
                return self.shutdown();
            }
        }
    }

    /// Attempt one TCP connect, bounded by the connect timeout, while still
    /// accepting commands and expiring queued deadlines.
    async fn connect(&mut self) -> ConnectOutcome {
        self.set_state(SessionState::Connecting);
        let connect_deadline = Instant::now() + self.config.connect_timeout();
        let connect_fut = TcpStream::connect(self.remote.socket_addr());
        tokio::pin!(connect_fut);

        loop {
            let queued_deadline = self.next_queued_deadline();
            tokio::select! {
                res = &mut connect_fut => {
                    return match res {
                        Ok(stream) => {
                            let _ = stream.set_nodelay(true);
                            ConnectOutcome::Connected(stream)
                        }
                        Err(e) => {
                            debug!(remote = %self.remote, error = %e, "tcp connect error");
                            ConnectOutcome::Failed
                        }
                    };
                }
                _ = sleep_until(connect_deadline) => {
                    debug!(remote = %self.remote, "connect timed out");
                    return ConnectOutcome::Failed;
                }
                _ = maybe_sleep(queued_deadline), if queued_deadline.is_some() => {
                    self.expire_queued();
                }
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Send(req)) => self.enqueue(req),
                    Some(Command::Close) | None => return ConnectOutcome::CloseRequested,
                },
            }
        }
    }

    /// Wait out the reconnect delay, doubling it for next time up to the
    /// ceiling. Returns false when a close was requested.
    async fn backoff(&mut self) -> bool {
        let until = Instant::now() + self.reconnect_delay;
        self.reconnect_delay = (self.reconnect_delay * 2).min(self.config.reconnect_delay_max());
        loop {
            let queued_deadline = self.next_queued_deadline();
            tokio::select! {
                _ = sleep_until(until) => return true,
                _ = maybe_sleep(queued_deadline), if queued_deadline.is_some() => {
                    self.expire_queued();
                }
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Send(req)) => self.enqueue(req),
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    /// Connected steady state: write commands as frames, correlate
    /// responses, expire deadlines.
    async fn run_connected(&mut self, stream: TcpStream) -> Exit {
        self.set_state(SessionState::Connected);
        ClientCounters::incr(&self.counters.session_connects);
        info!(remote = %self.remote, queued = self.queued.len(), "session connected");

        let (mut reader, mut writer) = stream.into_split();
        // Writes are serialized through a dedicated task; a failed write
        // surfaces as a closed channel on the next frame.
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Bytes>();
        let write_task = tokio::spawn(async move {
            while let Some(chunk) = write_rx.recv().await {
                if writer.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let mut read_buf = BytesMut::with_capacity(16 * 1024);

        // Flush the pre-connect queue in order; drop entries whose deadline
        // already passed.
        let now = Instant::now();
        while let Some(req) = self.queued.pop_front() {
            if req.deadline <= now {
                ClientCounters::incr(&self.counters.request_timeouts);
                let _ = req.completion.send(Err(ClientError::Timeout));
                continue;
            }
            if !self.write_request(req, &write_tx) {
                self.on_disconnect("write failed");
                write_task.abort();
                return Exit::Disconnected;
            }
        }

        use tokio::io::AsyncReadExt;
        loop {
            let next_deadline = self.next_pending_deadline();
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Send(req)) => {
                        if req.deadline <= Instant::now() {
                            ClientCounters::incr(&self.counters.request_timeouts);
                            let _ = req.completion.send(Err(ClientError::Timeout));
                        } else if !self.write_request(req, &write_tx) {
                            self.on_disconnect("write failed");
                            write_task.abort();
                            return Exit::Disconnected;
                        }
                    }
                    Some(Command::Close) | None => {
                        self.shutdown();
                        write_task.abort();
                        return Exit::Closed;
                    }
                },
                res = reader.read_buf(&mut read_buf) => match res {
                    Ok(0) => {
                        self.on_disconnect("closed by peer");
                        write_task.abort();
                        return Exit::Disconnected;
                    }
                    Ok(_) => {
                        if let Err(e) = self.drain_frames(&mut read_buf) {
                            warn!(remote = %self.remote, error = %e, "dropping connection on decode failure");
                            self.on_disconnect("decode failure");
                            write_task.abort();
                            return Exit::Disconnected;
                        }
                    }
                    Err(e) => {
                        debug!(remote = %self.remote, error = %e, "socket read error");
                        self.on_disconnect("read error");
                        write_task.abort();
                        return Exit::Disconnected;
                    }
                },
                _ = maybe_sleep(next_deadline), if next_deadline.is_some() => {
                    self.expire_pending();
                }
            }
        }
    }

    /// Assign the next sequence id, register the pending entry, and hand the
    /// encoded frame to the writer. Returns false when the writer is gone.
    fn write_request(&mut self, req: SendRequest, write_tx: &mpsc::UnboundedSender<Bytes>) -> bool {
        let seq_id = self.next_seq;
        self.next_seq += 1;

        let encoded = frame::encode_request(&RequestFrame {
            seq_id,
            trace_id: req.trace_id,
            timeout_ms: req.timeout_ms,
            gpid: req.gpid,
            op_code: req.op_code.to_string(),
            body: req.body,
        });

        if write_tx.send(encoded).is_err() {
            let _ = req.completion.send(Err(ClientError::Closed));
            return false;
        }

        self.deadlines.push(Reverse((req.deadline, seq_id)));
        self.pending.insert(
            seq_id,
            Pending {
                deadline: req.deadline,
                op_code: req.op_code,
                trace_id: req.trace_id,
                completion: req.completion,
            },
        );
        ClientCounters::incr(&self.counters.requests_sent);
        true
    }

    /// Decode every whole frame in the read buffer and complete its pending
    /// request. Unknown sequence ids are logged and discarded.
    fn drain_frames(&mut self, read_buf: &mut BytesMut) -> Result<(), FramingError> {
        while let Some(response) = frame::decode_response(read_buf, self.config.max_frame_size)? {
            match self.pending.remove(&response.seq_id) {
                Some(pending) => {
                    ClientCounters::incr(&self.counters.responses_received);
                    debug!(
                        remote = %self.remote,
                        seq_id = response.seq_id,
                        trace_id = pending.trace_id,
                        op = pending.op_code,
                        "response received"
                    );
                    let _ = pending.completion.send(Ok(response));
                }
                None => {
                    debug!(
                        remote = %self.remote,
                        seq_id = response.seq_id,
                        "discarding response with unknown sequence id"
                    );
                }
            }
        }
        Ok(())
    }

    /// Accept a request while not connected, respecting the buffer bound.
    fn enqueue(&mut self, req: SendRequest) {
        if self.queued.len() >= self.config.pending_send_capacity {
            ClientCounters::incr(&self.counters.send_overflows);
            let _ = req.completion.send(Err(ClientError::Overflow));
            return;
        }
        self.queued.push_back(req);
    }

    fn next_pending_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|entry| (entry.0).0)
    }

    fn next_queued_deadline(&self) -> Option<Instant> {
        self.queued.iter().map(|r| r.deadline).min()
    }

    /// Fail every written request whose deadline has passed.
    fn expire_pending(&mut self) {
        let now = Instant::now();
        while let Some(Reverse((deadline, seq_id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if let Some(pending) = self.pending.remove(&seq_id) {
                ClientCounters::incr(&self.counters.request_timeouts);
                debug!(
                    remote = %self.remote,
                    seq_id,
                    trace_id = pending.trace_id,
                    op = pending.op_code,
                    "request deadline elapsed"
                );
                let _ = pending.completion.send(Err(ClientError::Timeout));
            }
        }
    }

    /// Fail every queued request after a connect failure.
    fn fail_queued_transport(&mut self) {
        while let Some(req) = self.queued.pop_front() {
            let _ = req
                .completion
                .send(Err(ClientError::ReplicaUnreachable(self.remote)));
        }
    }

    /// Fail every queued request whose deadline has passed, keeping order
    /// for the rest.
    fn expire_queued(&mut self) {
        let now = Instant::now();
        let mut kept = VecDeque::with_capacity(self.queued.len());
        while let Some(req) = self.queued.pop_front() {
            if req.deadline <= now {
                ClientCounters::incr(&self.counters.request_timeouts);
                let _ = req.completion.send(Err(ClientError::Timeout));
            } else {
                kept.push_back(req);
            }
        }
        self.queued = kept;
    }

    /// Socket-level failure: drain in-flight requests with `Closed` and go
    /// disconnected. Queued requests stay for the reconnect.
    fn on_disconnect(&mut self, reason: &str) {
        ClientCounters::incr(&self.counters.session_disconnects);
        info!(
            remote = %self.remote,
            reason,
            in_flight = self.pending.len(),
            "session disconnected"
        );
        for (_, pending) in self.pending.drain() {
            let _ = pending.completion.send(Err(ClientError::Closed));
        }
        self.deadlines.clear();
        self.set_state(SessionState::Disconnected);
    }

    /// Orderly close: everything outstanding completes with `Closed`.
    fn shutdown(&mut self) {
        self.set_state(SessionState::Closing);
        for (_, pending) in self.pending.drain() {
            let _ = pending.completion.send(Err(ClientError::Closed));
        }
        while let Some(req) = self.queued.pop_front() {
            let _ = req.completion.send(Err(ClientError::Closed));
        }
        while let Ok(cmd) = self.rx.try_recv() {
            if let Command::Send(req) = cmd {
                let _ = req.completion.send(Err(ClientError::Closed));
            }
        }
        self.deadlines.clear();
        self.set_state(SessionState::Closed);
        info!(remote = %self.remote, "session closed");
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

enum ConnectOutcome {
    Connected(TcpStream),
    Failed,
    CloseRequested,
}

/// Sleep until an optional deadline; pending forever when `None`.
///
/// Callers guard the select arm with `is_some()`, so the `None` branch is
/// never polled.
async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}
