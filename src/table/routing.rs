//! Partition configurations and the per-table routing snapshot.
//!
//! A [`TableRouting`] is an immutable snapshot: readers clone the `Arc` and
//! route against it without further coordination, refresh publishes a whole
//! new snapshot. Ballots decide staleness when a refresh races an older meta
//! response: a configuration with a higher ballot supersedes a lower one,
//! never the reverse.

use crate::base::{hash, Endpoint, Gpid};
use crate::core::error::{ClientError, ClientResult};
use tokio::time::Instant;

/// One partition's replica configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfiguration {
    /// Global partition id.
    pub gpid: Gpid,
    /// Monotonically increasing configuration version.
    pub ballot: i64,
    /// Replica currently accepting reads and writes. Invalid when the
    /// partition has no live primary.
    pub primary: Endpoint,
    /// Secondary replicas.
    pub secondaries: Vec<Endpoint>,
    /// Replication factor reported by the meta cluster.
    pub max_replica_count: i32,
}

/// Immutable routing snapshot for one table.
#[derive(Debug)]
pub struct TableRouting {
    /// Application id assigned by the meta cluster.
    pub app_id: i32,
    /// Partition count; always a power of two and fixed for an open table.
    pub partition_count: i32,
    configs: Vec<PartitionConfiguration>,
    /// When this snapshot was published.
    refreshed_at: Instant,
    /// Publication counter used to coalesce refreshes.
    generation: u64,
}

impl TableRouting {
    /// Build a snapshot from a meta response.
    ///
    /// Validates the partition-count and index invariants the router relies
    /// on.
    pub fn new(
        app_id: i32,
        partition_count: i32,
        configs: Vec<PartitionConfiguration>,
        generation: u64,
    ) -> ClientResult<Self> {
        if !hash::is_valid_partition_count(partition_count) {
            return Err(ClientError::InvalidArgument(format!(
                "partition count {partition_count} is not a power of two"
            )));
        }
        if configs.len() != partition_count as usize {
            return Err(ClientError::InvalidArgument(format!(
                "expected {partition_count} partition configurations, got {}",
                configs.len()
            )));
        }
        for (i, config) in configs.iter().enumerate() {
            if config.gpid.partition_index != i as i32 {
                return Err(ClientError::InvalidArgument(format!(
                    "partition configuration {i} carries index {}",
                    config.gpid.partition_index
                )));
            }
            if config.gpid.app_id != app_id {
                return Err(ClientError::InvalidArgument(format!(
                    "partition configuration {i} carries app id {}",
                    config.gpid.app_id
                )));
            }
        }
        Ok(Self {
            app_id,
            partition_count,
            configs,
            refreshed_at: Instant::now(),
            generation,
        })
    }

    /// Merge a newly fetched set of configurations over this snapshot.
    ///
    /// Per-partition, the fresh configuration wins unless its ballot is
    /// lower than the cached one, which happens when a delayed meta response
    /// arrives after a newer one was applied.
    pub fn merged_with(
        &self,
        app_id: i32,
        partition_count: i32,
        fresh: Vec<PartitionConfiguration>,
        generation: u64,
    ) -> ClientResult<Self> {
        let mut merged = fresh;
        if app_id == self.app_id && partition_count == self.partition_count {
            for (cached, incoming) in self.configs.iter().zip(merged.iter_mut()) {
                if incoming.ballot < cached.ballot {
                    *incoming = cached.clone();
                }
            }
        }
        Self::new(app_id, partition_count, merged, generation)
    }

    /// Configuration of one partition.
    pub fn config(&self, partition_index: i32) -> &PartitionConfiguration {
        &self.configs[partition_index as usize]
    }

    /// Derive the partition index for a routing hash.
    pub fn partition_index(&self, routing_hash: u64) -> i32 {
        hash::partition_index(routing_hash, self.partition_count)
    }

    /// Age of this snapshot.
    pub fn age(&self) -> std::time::Duration {
        self.refreshed_at.elapsed()
    }

    /// Publication counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
