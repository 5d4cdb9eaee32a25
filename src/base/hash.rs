//! Routing hash and partition index derivation.
//!
//! The routing key is the hash key when one is present, otherwise the sort
//! key. It is hashed with CRC-64, and the partition index is the hash masked
//! by `partition_count - 1`. The server guarantees partition counts are
//! powers of two, which is what makes the mask equivalent to the modulo;
//! [`partition_index`] refuses anything else.

use crc64fast_nvme::Digest;

/// Hash the routing key derived from a `(hash_key, sort_key)` pair.
///
/// A non-empty `hash_key` is the routing key; an empty one routes by
/// `sort_key` so that keys without a hash component still spread across
/// partitions deterministically.
pub fn routing_hash(hash_key: &[u8], sort_key: &[u8]) -> u64 {
    let mut digest = Digest::new();
    if !hash_key.is_empty() {
        digest.write(hash_key);
    } else {
        digest.write(sort_key);
    }
    digest.sum64()
}

/// Derive a partition index from a routing hash.
///
/// `partition_count` must be a positive power of two; the mask is only the
/// modulo under that condition.
pub fn partition_index(hash: u64, partition_count: i32) -> i32 {
    debug_assert!(
        partition_count > 0 && (partition_count as u32).is_power_of_two(),
        "partition_count must be a positive power of two, got {partition_count}"
    );
    (hash & (partition_count as u64 - 1)) as i32
}

/// Check that a partition count reported by the meta cluster is usable.
pub fn is_valid_partition_count(partition_count: i32) -> bool {
    partition_count > 0 && (partition_count as u32).is_power_of_two()
}
