//! # Domain Layer
//!
//! The domain layer contains the core business logic of the message
//! distribution and translation pipeline. It is independent of any external
//! frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Core domain entities (User, Conversation, Message, Connection)
//! - **gateways**: Traits for external collaborators (auth, translation, push, attachments)
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Store and directory traits define the persistence contracts
//! - Entities encapsulate message-state rules so every backend shares them

pub mod entities;
pub mod gateways;

// Re-export commonly used types
pub use entities::*;
pub use gateways::*;
