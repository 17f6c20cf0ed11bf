//! STOMP 1.2 text framing, the wire format of the real-time channel.

pub mod frame;

pub use frame::*;
