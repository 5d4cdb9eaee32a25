//! Operational concerns: client counters and metrics push.

pub mod metrics;

pub use metrics::{ClientCounters, MetricsReporter};
