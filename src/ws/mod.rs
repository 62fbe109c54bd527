//! Observer connections over WebSocket

pub mod handler;
pub mod protocol;
