//! WebSocket Endpoint
//!
//! Real-time communication via WebSocket connections. Each socket is one
//! connection in the registry; inbound frames are `{action, data}` events
//! handed to the dispatcher.

pub mod handler;

pub use handler::ws_handler;
