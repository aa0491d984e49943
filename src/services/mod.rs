//! External collaborators of the gateway.
//!
//! The revocation store is the only stateful dependency the request pipeline
//! consults before forwarding.

pub mod revocation;

// Re-export commonly used types
pub use revocation::{
    InMemoryRevocationStore, RedisRevocationStore, RevocationError, RevocationStore,
};
