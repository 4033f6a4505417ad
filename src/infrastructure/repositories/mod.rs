//! Repository Implementations
//!
//! PostgreSQL implementations of the domain store/directory traits.
//!
//! - **PgMessageStore** — ordered message log with reactions, receipts and
//!   soft-delete state
//! - **PgConversationDirectory** — per-participant visibility records
//! - **PgUserDirectory** — read-only identity lookups

pub mod conversation_directory;
pub mod message_store;
pub mod user_directory;

pub use conversation_directory::PgConversationDirectory;
pub use message_store::PgMessageStore;
pub use user_directory::PgUserDirectory;
