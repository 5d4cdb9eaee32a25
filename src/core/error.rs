//! Error types and server error code classification.
//!
//! [`ClientError`] is the single error surface of the crate. Transport
//! failures and stale routing are recovered internally by refresh and retry
//! bounded by the operation deadline; everything else reaches the caller
//! verbatim, with raw server codes preserved in
//! [`ClientError::ServerError`].

use crate::base::Endpoint;
use crate::rpc::frame::FramingError;
use thiserror::Error;

/// Errors surfaced to callers of the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The operation deadline elapsed before a final response arrived.
    #[error("operation deadline elapsed")]
    Timeout,

    /// The meta cluster does not know the requested table.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Every configured meta endpoint failed within the retry budget.
    #[error("meta cluster unreachable")]
    MetaUnreachable,

    /// A replica could not be reached and no retry fits within the deadline.
    #[error("replica unreachable: {0}")]
    ReplicaUnreachable(Endpoint),

    /// Inputs violate a constraint (empty hash key where one is required,
    /// oversized key, unresolvable address).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The per-session pending-send buffer is full.
    #[error("session send buffer full")]
    Overflow,

    /// A non-retryable server error code.
    #[error("server error: {0}")]
    ServerError(ServerCode),

    /// The client was closed while the operation was in flight.
    #[error("client closed")]
    Closed,

    /// A malformed frame was produced or received.
    #[error("framing: {0}")]
    Framing(#[from] FramingError),
}

/// Result type using [`ClientError`].
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Check whether this error is a transport-level failure that routing
    /// refresh plus retry may recover from.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ReplicaUnreachable(_) | Self::Closed | Self::Framing(_)
        )
    }
}

/// Server error codes as carried on the wire.
///
/// Codes the client never inspects individually are preserved losslessly in
/// [`ServerCode::Other`] so callers see the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerCode {
    Ok,
    Unknown,
    Timeout,
    ObjectNotFound,
    InvalidState,
    NotEnoughMember,
    ParentPartitionMisused,
    Busy,
    CapacityExceeded,
    ForwardToOthers,
    InvalidData,
    /// Any code the client has no dedicated handling for.
    Other(i32),
}

impl ServerCode {
    /// Decode a wire error code.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Unknown,
            2 => Self::Timeout,
            3 => Self::ObjectNotFound,
            4 => Self::InvalidState,
            5 => Self::NotEnoughMember,
            6 => Self::ParentPartitionMisused,
            7 => Self::Busy,
            8 => Self::CapacityExceeded,
            9 => Self::ForwardToOthers,
            10 => Self::InvalidData,
            other => Self::Other(other),
        }
    }

    /// The wire representation of this code.
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Unknown => 1,
            Self::Timeout => 2,
            Self::ObjectNotFound => 3,
            Self::InvalidState => 4,
            Self::NotEnoughMember => 5,
            Self::ParentPartitionMisused => 6,
            Self::Busy => 7,
            Self::CapacityExceeded => 8,
            Self::ForwardToOthers => 9,
            Self::InvalidData => 10,
            Self::Other(code) => *code,
        }
    }

    /// Codes that indicate the cached routing table is stale: retry after a
    /// meta refresh.
    pub fn needs_refresh(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound
                | Self::InvalidState
                | Self::NotEnoughMember
                | Self::ParentPartitionMisused
        )
    }

    /// Codes that are transient on the server side: retry without refresh.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::CapacityExceeded)
    }

    /// Stable name for logging and display.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "ERR_OK",
            Self::Unknown => "ERR_UNKNOWN",
            Self::Timeout => "ERR_TIMEOUT",
            Self::ObjectNotFound => "ERR_OBJECT_NOT_FOUND",
            Self::InvalidState => "ERR_INVALID_STATE",
            Self::NotEnoughMember => "ERR_NOT_ENOUGH_MEMBER",
            Self::ParentPartitionMisused => "ERR_PARENT_PARTITION_MISUSED",
            Self::Busy => "ERR_BUSY",
            Self::CapacityExceeded => "ERR_CAPACITY_EXCEEDED",
            Self::ForwardToOthers => "ERR_FORWARD_TO_OTHERS",
            Self::InvalidData => "ERR_INVALID_DATA",
            Self::Other(_) => "ERR_OTHER",
        }
    }
}

impl std::fmt::Display for ServerCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(code) => write!(f, "ERR_OTHER({code})"),
            other => f.write_str(other.name()),
        }
    }
}
