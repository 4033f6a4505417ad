//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! - **EventDispatcher**: the fan-out pipeline behind every realtime event
//! - **NotificationFallback**: offline push after fan-out

pub mod dispatcher;
pub mod notification_fallback;

pub use dispatcher::EventDispatcher;
pub use notification_fallback::{render_push_body, NotificationFallback, PUSH_BODY_MAX_CHARS};
