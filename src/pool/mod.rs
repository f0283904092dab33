//! Bounded, destination-keyed connection pooling.
//!
//! The pool hands out exclusive leases ([`PooledConnection`]), accepts
//! return-and-reset on release, and reclaims connections that have sat idle
//! past a configured threshold. Lease transitions can be observed through a
//! subscriber hook.

pub use connection_pool::{ConnectionPool, LeaseState, PoolListener};
pub use lease::PooledConnection;

mod connection_pool;
mod lease;
