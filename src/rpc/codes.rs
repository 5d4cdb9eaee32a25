//! Operation code constants.
//!
//! Operation codes travel on the wire as ASCII strings in the frame meta
//! section. Meta operations use the `CM_` prefix; replica data operations use
//! the storage-engine style `RPC_RRDB_RRDB_` prefix.

/// Query the partition configuration of a table from the meta cluster.
pub const CM_QUERY_CONFIG: &str = "CM_QUERY_CONFIG";

/// Read a single value.
pub const RPC_RRDB_RRDB_GET: &str = "RPC_RRDB_RRDB_GET";
/// Write a single value.
pub const RPC_RRDB_RRDB_PUT: &str = "RPC_RRDB_RRDB_PUT";
/// Read multiple sort keys under one hash key.
pub const RPC_RRDB_RRDB_MULTI_GET: &str = "RPC_RRDB_RRDB_MULTI_GET";
/// Write multiple sort keys under one hash key.
pub const RPC_RRDB_RRDB_MULTI_PUT: &str = "RPC_RRDB_RRDB_MULTI_PUT";
/// Remove a single value.
pub const RPC_RRDB_RRDB_REMOVE: &str = "RPC_RRDB_RRDB_REMOVE";
/// Remove multiple sort keys under one hash key.
pub const RPC_RRDB_RRDB_MULTI_REMOVE: &str = "RPC_RRDB_RRDB_MULTI_REMOVE";
/// Atomic increment.
pub const RPC_RRDB_RRDB_INCR: &str = "RPC_RRDB_RRDB_INCR";
/// Query remaining time-to-live.
pub const RPC_RRDB_RRDB_TTL: &str = "RPC_RRDB_RRDB_TTL";
/// Count sort keys under one hash key.
pub const RPC_RRDB_RRDB_SORTKEY_COUNT: &str = "RPC_RRDB_RRDB_SORTKEY_COUNT";
/// Open a scanner on a partition.
pub const RPC_RRDB_RRDB_GET_SCANNER: &str = "RPC_RRDB_RRDB_GET_SCANNER";
/// Fetch the next batch from an open scanner.
pub const RPC_RRDB_RRDB_SCAN: &str = "RPC_RRDB_RRDB_SCAN";
/// Release an open scanner.
pub const RPC_RRDB_RRDB_CLEAR_SCANNER: &str = "RPC_RRDB_RRDB_CLEAR_SCANNER";
