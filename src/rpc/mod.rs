//! RPC engine: framing, sessions, the replica session pool, and the meta
//! session.
//!
//! - [`codes`] - Operation code constants
//! - [`frame`] - Length-prefixed frame codec with CRC-protected headers
//! - [`session`] - One long-lived connection per remote endpoint
//! - [`pool`] - Shared endpoint-to-session map
//! - [`meta`] - Meta cluster querying with leader tracking and failover

pub mod codes;
pub mod frame;
pub mod meta;
pub mod pool;
pub mod session;

pub use meta::MetaSession;
pub use pool::ReplicaSessionPool;
pub use session::{SendRequest, Session, SessionState};
