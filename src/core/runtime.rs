//! Runtime helpers.
//!
//! The client runs on the caller's Tokio runtime: sessions are spawned tasks,
//! not threads the client owns. Applications without a runtime of their own
//! can build a dedicated one sized by `io_threads` and drive the async API
//! through `Runtime::block_on`.

use crate::core::config::ClientConfig;
use std::io;

/// Build a multi-threaded I/O runtime sized by the configured `io_threads`.
///
/// The runtime enables the time and I/O drivers only; nothing else in the
/// client needs more.
pub fn build_io_runtime(config: &ClientConfig) -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.io_threads.max(1))
        .thread_name("plexus-io")
        .enable_io()
        .enable_time()
        .build()
}
