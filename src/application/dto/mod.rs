//! Data Transfer Objects
//!
//! Inbound realtime events and outbound event/view serialization.

pub mod events;
pub mod response;

pub use events::{
    AttachmentPayload, ClientEvent, DeletePayload, ReactionPayload, ReadPayload, ReplyToPayload,
    SendPayload, TypingPayload,
};
pub use response::{
    ConversationView, DeletedBroadcast, MessagePageResponse, MessageView, ReactionBroadcast,
    ReadBroadcast, ServerEvent, TypingBroadcast, UserSnapshot,
};
