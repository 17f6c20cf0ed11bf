pub mod stomp_channel;
pub mod connection_task;

pub use stomp_channel::*;
