//! Plexus - async client for a partitioned, replicated key-value store.
//!
//! Plexus turns a logical table operation, keyed by a `(hash_key, sort_key)`
//! pair, into an in-order, retried, deadline-bounded request against the
//! correct replica of the correct partition, over long-lived TCP
//! connections. Partition-to-replica mappings come from a small meta
//! cluster and are cached per table; stale routing is detected from server
//! error codes and repaired by a coalesced refresh.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Data Operations                           │
//! │        get │ set │ del │ incr │ ttl │ multi_* │ counts          │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Table Handler                            │
//! │        routing cache │ refresh │ retry loop │ deadlines         │
//! └─────────────────────────────────────────────────────────────────┘
//!                │                                  │
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │        Meta Session          │  │     Replica Session Pool     │
//! │ leader guess │ forward hints │  │  one session per endpoint    │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Session                               │
//! │  pending table │ deadline heap │ reconnect │ framed TCP         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error surface and server code classification
//! - [`core::runtime`] - Dedicated I/O runtime helper
//!
//! ## Identity
//! - [`base::endpoint`] - Typed network endpoint
//! - [`base::gpid`] - Global partition id
//! - [`base::hash`] - Routing hash and partition index derivation
//!
//! ## RPC
//! - [`rpc::frame`] - Frame codec with CRC-protected headers
//! - [`rpc::session`] - Long-lived connection with pipelined requests
//! - [`rpc::pool`] - Shared endpoint-to-session map
//! - [`rpc::meta`] - Meta cluster querying and failover
//!
//! ## Tables
//! - [`table::routing`] - Partition configurations and routing snapshots
//! - [`table::handler`] - Routing cache, refresh, and the execute loop
//! - [`table::operator`] - Per-call lifecycle and retry classification
//! - [`table::api`] - Data operations
//! - [`table::codec`] - Body layouts per operation kind
//!
//! ## Operations
//! - [`ops::metrics`] - Client counters and metrics push
//!
//! # Key Invariants
//!
//! - Every request completes exactly once, on or before its deadline
//! - Sequence ids are monotonic per session in enqueue order
//! - Routing uses `hash & (partition_count - 1)`; partition counts are
//!   powers of two
//! - Concurrent refreshes for one table collapse into one meta query
//! - After close, no frame leaves the client and everything outstanding
//!   completes with `Closed`
//!
//! # Usage
//!
//! ```rust,no_run
//! use plexus::{ClientConfig, Cluster};
//!
//! # async fn example() -> Result<(), plexus::ClientError> {
//! let cluster = Cluster::new(ClientConfig::new(["127.0.0.1:34601"]))?;
//! let table = cluster.open_table("temp").await?;
//! table.set(b"user:42", b"profile", b"{}", 0).await?;
//! let value = table.get(b"user:42", b"profile", 0).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The client is Tokio-only: create the cluster inside a runtime, or build
//! one with [`core::runtime::build_io_runtime`] and `block_on` the calls.

// Core infrastructure
pub mod core;

// Identity value types
pub mod base;

// RPC engine
pub mod rpc;

// Table routing and data operations
pub mod table;

// Cluster entry point
pub mod cluster;

// Operational concerns
pub mod ops;

// Re-exports for convenience
pub use self::core::config::ClientConfig;
pub use self::core::error::{ClientError, ClientResult, ServerCode};
pub use base::{Endpoint, Gpid};
pub use cluster::Cluster;
pub use rpc::frame::FramingError;
pub use table::handler::TableHandler;
pub use table::operator::{Operator, RetryPolicy};
