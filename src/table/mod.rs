//! Table routing and the per-operation request lifecycle.
//!
//! - [`routing`] - Partition configurations and the routing snapshot
//! - [`handler`] - Per-table routing cache, refresh, and the execute loop
//! - [`operator`] - The per-call value object and response classification
//! - [`api`] - Data operations (get/set/del/...) over the execute loop
//! - [`codec`] - Request and response body layouts per operation kind

pub mod api;
pub mod codec;
pub mod handler;
pub mod operator;
pub mod routing;

pub use handler::TableHandler;
pub use routing::{PartitionConfiguration, TableRouting};
