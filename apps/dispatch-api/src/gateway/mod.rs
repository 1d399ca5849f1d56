//! Real-time gateway: authenticated WebSocket sessions, group membership,
//! and trip dispatch.

pub mod dispatch;
pub mod envelope;
pub mod server;
pub mod session;
