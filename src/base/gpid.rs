//! Global partition identifier.

use serde::{Deserialize, Serialize};

/// A global partition id: the pair of an application id assigned by the meta
/// cluster and a partition index within `[0, partition_count)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Gpid {
    /// Application (table) id assigned by the meta cluster.
    pub app_id: i32,
    /// Partition index within the table.
    pub partition_index: i32,
}

impl Gpid {
    /// Create a new gpid.
    pub const fn new(app_id: i32, partition_index: i32) -> Self {
        Self {
            app_id,
            partition_index,
        }
    }

    /// The zero gpid, used for operations that are not partition-addressed
    /// (meta queries).
    pub const fn zero() -> Self {
        Self {
            app_id: 0,
            partition_index: 0,
        }
    }
}

impl std::fmt::Display for Gpid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.app_id, self.partition_index)
    }
}
