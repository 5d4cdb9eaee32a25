//! Address and identity value types.
//!
//! - [`endpoint`] - Typed network endpoint for meta and replica servers
//! - [`gpid`] - Global partition identifier
//! - [`hash`] - Routing hash and partition index derivation

pub mod endpoint;
pub mod gpid;
pub mod hash;

pub use endpoint::Endpoint;
pub use gpid::Gpid;
