//! Common Test Utilities
//!
//! In-memory implementations of the domain store/directory traits plus
//! mock collaborators, so the whole fan-out pipeline can be driven without
//! Postgres, Redis or live HTTP services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use lingua_chat_server::application::dto::ClientEvent;
use lingua_chat_server::application::services::{EventDispatcher, NotificationFallback};
use lingua_chat_server::domain::{
    validate_new_conversation, validate_removal, AttachmentStore, ConversationDirectory,
    ConversationKind, LastMessage, Message, MessagePage, MessageStatus, MessageStore, NewMessage,
    PushMessage, PushProvider, TranslateRequest, TranslationGateway, User, UserDirectory,
    VisibilityRecord,
};
use lingua_chat_server::infrastructure::registry::ConnectionRegistry;
use lingua_chat_server::shared::error::AppError;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

mockall::mock! {
    pub Translator {}

    #[async_trait]
    impl TranslationGateway for Translator {
        async fn detect_language(&self, text: &str) -> Result<String, AppError>;
        async fn translate(&self, request: TranslateRequest) -> Result<String, AppError>;
        async fn translate_document(&self, request: TranslateRequest) -> Result<String, AppError>;
    }
}

mockall::mock! {
    pub Push {}

    #[async_trait]
    impl PushProvider for Push {
        async fn push(&self, message: PushMessage) -> Result<(), AppError>;
    }
}

mockall::mock! {
    pub Attachments {}

    #[async_trait]
    impl AttachmentStore for Attachments {
        async fn purge(&self, key: &str) -> Result<(), AppError>;
    }
}

/// A translator that detects the given language and is never asked to
/// translate.
pub fn detector(language: &'static str) -> MockTranslator {
    let mut translator = MockTranslator::new();
    translator
        .expect_detect_language()
        .returning(move |_| Ok(language.to_string()));
    translator
}

/// A push provider that accepts anything.
pub fn accepting_push() -> MockPush {
    let mut push = MockPush::new();
    push.expect_push().returning(|_| Ok(()));
    push
}

/// An attachment store that is never called.
pub fn untouched_attachments() -> MockAttachments {
    MockAttachments::new()
}

// ---------------------------------------------------------------------------
// In-memory message store
// ---------------------------------------------------------------------------

/// In-memory [`MessageStore`] with deterministic, monotonic ordering keys.
pub struct InMemoryMessageStore {
    next: AtomicI64,
    messages: Mutex<HashMap<(i64, i64), Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1_000),
            messages: Mutex::new(HashMap::new()),
        }
    }

    /// Direct (non-trait) read for assertions.
    pub fn snapshot(&self, conversation_id: i64, timestamp: i64) -> Option<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(&(conversation_id, timestamp))
            .cloned()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, draft: NewMessage) -> Result<Message, AppError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id,
            conversation_id: draft.conversation_id,
            timestamp: id,
            sender_id: draft.sender_id,
            kind: draft.kind,
            content: draft.content,
            original_language: draft.original_language,
            translations: HashMap::new(),
            attachment: draft.attachment,
            reply_to: draft.reply_to,
            reactions: Default::default(),
            read_by: Vec::new(),
            status: MessageStatus::Sent,
            deleted_by: Vec::new(),
            deleted_for_everyone: false,
            deleted_at: None,
            created_at: Utc::now(),
        };
        self.messages
            .lock()
            .unwrap()
            .insert((message.conversation_id, message.timestamp), message.clone());
        Ok(message)
    }

    async fn get(&self, conversation_id: i64, timestamp: i64) -> Result<Option<Message>, AppError> {
        Ok(self.snapshot(conversation_id, timestamp))
    }

    async fn list_page(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        limit: i64,
        before: Option<i64>,
    ) -> Result<MessagePage, AppError> {
        let limit = limit.clamp(1, 100) as usize;
        let mut rows: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| !m.is_hidden_for(viewer_id))
            .filter(|m| before.map_or(true, |cursor| m.timestamp < cursor))
            .cloned()
            .collect();
        rows.sort_by_key(|m| std::cmp::Reverse(m.timestamp));

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        rows.reverse();
        let cursor = rows.first().map(|m| m.timestamp);
        Ok(MessagePage {
            messages: rows,
            has_more,
            cursor,
        })
    }

    async fn toggle_reaction(
        &self,
        conversation_id: i64,
        timestamp: i64,
        user_id: i64,
        emoji: &str,
    ) -> Result<Message, AppError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&(conversation_id, timestamp))
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", timestamp)))?;
        message.toggle_reaction(user_id, emoji);
        Ok(message.clone())
    }

    async fn mark_read(
        &self,
        conversation_id: i64,
        timestamp: i64,
        user_id: i64,
    ) -> Result<bool, AppError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&(conversation_id, timestamp))
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", timestamp)))?;
        Ok(message.mark_read(user_id))
    }

    async fn soft_delete(
        &self,
        conversation_id: i64,
        timestamp: i64,
        requester_id: i64,
        for_everyone: bool,
    ) -> Result<Message, AppError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&(conversation_id, timestamp))
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", timestamp)))?;
        message.soft_delete(requester_id, for_everyone, Utc::now())?;
        Ok(message.clone())
    }

    async fn cache_translations(
        &self,
        conversation_id: i64,
        timestamp: i64,
        entries: &HashMap<String, String>,
    ) -> Result<(), AppError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .get_mut(&(conversation_id, timestamp))
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", timestamp)))?;
        // Field-level merge: only the given keys change.
        for (language, text) in entries {
            message
                .translations
                .insert(language.clone(), text.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory conversation directory
// ---------------------------------------------------------------------------

/// In-memory [`ConversationDirectory`] honoring the same contract as the
/// Postgres implementation.
pub struct InMemoryDirectory {
    next: AtomicI64,
    records: Mutex<HashMap<(i64, i64), VisibilityRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// All records of one conversation, for invariant assertions.
    pub fn records_of(&self, conversation_id: i64) -> Vec<VisibilityRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConversationDirectory for InMemoryDirectory {
    async fn records_for(&self, user_id: i64) -> Result<Vec<VisibilityRecord>, AppError> {
        let mut records: Vec<VisibilityRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.participant_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.updated_at));
        Ok(records)
    }

    async fn record(
        &self,
        conversation_id: i64,
        participant_id: i64,
    ) -> Result<Option<VisibilityRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(conversation_id, participant_id))
            .cloned())
    }

    async fn participants(&self, conversation_id: i64) -> Result<Vec<i64>, AppError> {
        self.records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.conversation_id == conversation_id)
            .map(|r| r.participant_ids.clone())
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {} not found", conversation_id))
            })
    }

    async fn create_conversation(
        &self,
        creator_id: i64,
        kind: ConversationKind,
        participant_ids: &[i64],
        name: Option<String>,
    ) -> Result<VisibilityRecord, AppError> {
        validate_new_conversation(kind, participant_ids)?;

        let mut participants = participant_ids.to_vec();
        participants.sort_unstable();
        participants.dedup();
        if !participants.contains(&creator_id) {
            return Err(AppError::Forbidden(
                "The creator must be a participant".into(),
            ));
        }

        let mut records = self.records.lock().unwrap();

        if kind == ConversationKind::Direct {
            if let Some(existing) = records.values().find(|r| {
                r.kind == ConversationKind::Direct
                    && r.participant_id == creator_id
                    && r.participant_ids.len() == 2
                    && participants.iter().all(|p| r.participant_ids.contains(p))
            }) {
                return Ok(existing.clone());
            }
        }

        let conversation_id = self.next.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        for participant_id in &participants {
            records.insert(
                (conversation_id, *participant_id),
                VisibilityRecord {
                    conversation_id,
                    participant_id: *participant_id,
                    kind,
                    name: name.clone(),
                    participant_ids: participants.clone(),
                    last_message: None,
                    unread_count: 0,
                    last_read_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        Ok(records
            .get(&(conversation_id, creator_id))
            .cloned()
            .expect("creator record was just inserted"))
    }

    async fn add_participants(
        &self,
        conversation_id: i64,
        new_ids: &[i64],
    ) -> Result<Vec<i64>, AppError> {
        let mut records = self.records.lock().unwrap();
        let head = records
            .values()
            .find(|r| r.conversation_id == conversation_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;

        if head.kind != ConversationKind::Group {
            return Err(AppError::Forbidden(
                "Participants can only be added to group conversations".into(),
            ));
        }

        let mut merged = head.participant_ids.clone();
        let mut added = Vec::new();
        for id in new_ids {
            if !merged.contains(id) {
                merged.push(*id);
                added.push(*id);
            }
        }
        merged.sort_unstable();

        let now = Utc::now();
        for record in records
            .values_mut()
            .filter(|r| r.conversation_id == conversation_id)
        {
            record.participant_ids = merged.clone();
            record.updated_at = now;
        }
        for id in added {
            records.insert(
                (conversation_id, id),
                VisibilityRecord {
                    conversation_id,
                    participant_id: id,
                    kind: head.kind,
                    name: head.name.clone(),
                    participant_ids: merged.clone(),
                    last_message: None,
                    unread_count: 0,
                    last_read_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(merged)
    }

    async fn remove_participant(
        &self,
        conversation_id: i64,
        target_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        let mut records = self.records.lock().unwrap();
        let head = records
            .values()
            .find(|r| r.conversation_id == conversation_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;

        validate_removal(head.kind, &head.participant_ids, target_id)?;

        let remaining: Vec<i64> = head
            .participant_ids
            .iter()
            .copied()
            .filter(|id| *id != target_id)
            .collect();

        records.remove(&(conversation_id, target_id));
        let now = Utc::now();
        for record in records
            .values_mut()
            .filter(|r| r.conversation_id == conversation_id)
        {
            record.participant_ids = remaining.clone();
            record.updated_at = now;
        }
        Ok(remaining)
    }

    async fn touch_last_message(&self, message: &Message) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        let now = Utc::now();
        for record in records
            .values_mut()
            .filter(|r| r.conversation_id == message.conversation_id)
        {
            record.last_message = Some(LastMessage::from(message));
            record.updated_at = now;
            if record.participant_id != message.sender_id {
                record.unread_count += 1;
            }
        }
        Ok(())
    }

    async fn mark_read_through(
        &self,
        conversation_id: i64,
        participant_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(record) = self
            .records
            .lock()
            .unwrap()
            .get_mut(&(conversation_id, participant_id))
        {
            record.unread_count = 0;
            record.last_read_at = Some(read_at);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory user directory
// ---------------------------------------------------------------------------

pub struct InMemoryUsers {
    users: HashMap<i64, User>,
}

impl InMemoryUsers {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<User>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub type TestDispatcher = EventDispatcher<
    InMemoryMessageStore,
    InMemoryDirectory,
    InMemoryUsers,
    MockTranslator,
    MockPush,
    MockAttachments,
>;

pub struct Harness {
    pub store: Arc<InMemoryMessageStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: TestDispatcher,
}

/// Wire a dispatcher over in-memory state and the given mocks.
pub fn harness(
    users: Vec<User>,
    translator: MockTranslator,
    push: MockPush,
    attachments: MockAttachments,
    always_push: bool,
) -> Harness {
    let store = Arc::new(InMemoryMessageStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let registry = Arc::new(ConnectionRegistry::new(60));
    let notifications = NotificationFallback::new(Arc::new(push), always_push);
    let dispatcher = EventDispatcher::new(
        store.clone(),
        directory.clone(),
        Arc::new(InMemoryUsers::new(users)),
        Arc::new(translator),
        Arc::new(attachments),
        notifications,
        registry.clone(),
    );
    Harness {
        store,
        directory,
        registry,
        dispatcher,
    }
}

/// Register a live connection and return its frame receiver.
pub fn connect(registry: &ConnectionRegistry, user_id: i64) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry.register(user_id, Uuid::new_v4(), tx);
    rx
}

/// Drain all frames currently queued on a connection, parsed as JSON.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("delivered frame is JSON"));
    }
    frames
}

/// Test user fixture.
pub fn user(id: i64, username: &str, language: &str, country: Option<&str>) -> User {
    User {
        id,
        username: username.to_string(),
        preferred_language: language.to_string(),
        preferred_country: country.map(String::from),
        preferred_region: None,
        avatar_url: None,
    }
}

/// Shorthand for a plain text `message:send` event.
pub fn text_send(conversation_id: i64, content: &str) -> ClientEvent {
    use lingua_chat_server::application::dto::SendPayload;
    use lingua_chat_server::domain::MessageKind;

    ClientEvent::MessageSend(SendPayload {
        conversation_id,
        content: content.to_string(),
        kind: MessageKind::Text,
        attachment: None,
        reply_to: None,
        translate_document: false,
    })
}
