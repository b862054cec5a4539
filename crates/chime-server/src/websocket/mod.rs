//! WebSocket side of the server: registry, sessions, heartbeat and fan-out.

pub mod broadcast;
pub mod connection;
pub mod heartbeat;
pub mod registry;
pub mod session;
