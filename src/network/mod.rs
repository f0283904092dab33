//! Client networking layer.
//!
//! This module owns all socket handling for the broker client:
//! - `FramedChannel`: one TCP socket with the broker's short-read framing
//! - `Connection`: the per-session state machine around a channel
//! - `Destination`: endpoint identity, also used as the pool key
//!
//! Callers above this module (the pool, the dao layer) never touch a
//! socket directly.

pub use channel::{FramedChannel, CRLF};
pub use connection::{Connection, DISCONNECT_MESSAGE};
pub use destination::Destination;

mod channel;
mod connection;
mod destination;
