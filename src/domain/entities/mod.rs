//! # Domain Entities
//!
//! Core domain entities of the realtime distribution core.
//!
//! - **User**: read-only identity snapshot (language/country preferences)
//! - **Conversation**: per-participant visibility records and membership rules
//! - **Message**: ordered message state with reactions, receipts, soft deletes
//! - **Connection**: ephemeral live-connection metadata
//!
//! Each persisted entity carries its store/directory trait in the same file;
//! the traits are implemented in the infrastructure layer, following the
//! dependency inversion principle.

mod connection;
mod conversation;
mod message;
mod user;

pub use connection::Connection;

pub use conversation::{
    normalize_direct_pair, validate_new_conversation, validate_removal, ConversationDirectory,
    ConversationKind, LastMessage, VisibilityRecord, MIN_GROUP_PARTICIPANTS,
};

pub use message::{
    truncate_chars, Attachment, Message, MessageKind, MessagePage, MessageStatus, MessageStore,
    NewMessage, ReplyPreview, DELETED_PLACEHOLDER, REPLY_PREVIEW_MAX_CHARS,
};

pub use user::{User, UserDirectory};
